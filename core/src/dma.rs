use num::FromPrimitive;

use arm7tdmi::memory::MemoryInterface;

use super::interrupt::{self, Interrupt, InterruptConnect, SharedInterruptFlags};
use super::sysbus::SysBus;

pub const TIMING_IMMEDIATE: u16 = 0;
pub const TIMING_VBLANK: u16 = 1;
pub const TIMING_HBLANK: u16 = 2;

bitfield! {
    #[derive(Serialize, Deserialize, Clone, Copy, Default)]
    pub struct DmaChannelCtrl(u16);
    impl Debug;
    u16;
    dst_adj, _ : 6, 5;
    src_adj, _ : 8, 7;
    repeat, _ : 9;
    is_32bit, _: 10;
    timing, _: 13, 12;
    is_triggering_irq, _: 14;
    is_enabled, set_enabled: 15;
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct DmaInternalRegs {
    src_addr: u32,
    dst_addr: u32,
    count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DmaChannel {
    id: usize,

    pub src: u32,
    pub dst: u32,
    pub wc: u32,
    pub ctrl: DmaChannelCtrl,

    // latched when the channel is enabled
    internal: DmaInternalRegs,

    irq: Interrupt,
    #[serde(skip)]
    interrupt_flags: SharedInterruptFlags,
}

impl DmaChannel {
    pub fn new(id: usize, interrupt_flags: SharedInterruptFlags) -> DmaChannel {
        if id > 3 {
            panic!("invalid dma id {}", id);
        }
        DmaChannel {
            id,
            irq: Interrupt::from_usize(id + 8).unwrap(),
            src: 0,
            dst: 0,
            wc: 0,
            ctrl: DmaChannelCtrl(0),
            internal: Default::default(),
            interrupt_flags,
        }
    }

    pub fn write_src_low(&mut self, low: u16) {
        self.src = (self.src & 0xffff_0000) | (low as u32);
    }

    pub fn write_src_high(&mut self, high: u16) {
        let high = (high & 0xfff) as u32;
        self.src = (self.src & 0xffff) | (high << 16);
    }

    pub fn write_dst_low(&mut self, low: u16) {
        self.dst = (self.dst & 0xffff_0000) | (low as u32);
    }

    pub fn write_dst_high(&mut self, high: u16) {
        let high = (high & 0xfff) as u32;
        self.dst = (self.dst & 0xffff) | (high << 16);
    }

    pub fn write_word_count(&mut self, value: u16) {
        self.wc = value as u32;
    }

    /// Returns true when the write started an immediate transfer.
    fn write_dma_ctrl(&mut self, value: u16) -> bool {
        let ctrl = DmaChannelCtrl(value);
        let mut start_immediately = false;
        if ctrl.is_enabled() && !self.ctrl.is_enabled() {
            debug!(
                "DMA{} enabled: timing={} src={:#x} dst={:#x} count={}",
                self.id,
                ctrl.timing(),
                self.src,
                self.dst,
                self.wc
            );
            self.internal.src_addr = self.src;
            self.internal.dst_addr = self.dst;
            self.internal.count = self.wc;
            start_immediately = ctrl.timing() == TIMING_IMMEDIATE;
        }
        self.ctrl = ctrl;
        start_immediately
    }

    /// Run the latched transfer. Returns the bus cycles it consumed
    /// (a fixed 2-per-unit approximation plus setup).
    fn xfer(&mut self, sb: &mut SysBus) -> usize {
        let word_size = if self.ctrl.is_32bit() { 4u32 } else { 2u32 };
        let count = match self.internal.count {
            0 => match self.id {
                3 => 0x1_0000,
                _ => 0x0_4000,
            },
            _ => self.internal.count,
        };

        let src_adj = match self.ctrl.src_adj() {
            /* increment */ 0 => word_size,
            /* decrement */ 1 => word_size.wrapping_neg(),
            /* fixed */ _ => 0,
        };
        let dst_adj = match self.ctrl.dst_adj() {
            /* increment[+reload] */ 0 | 3 => word_size,
            /* decrement */ 1 => word_size.wrapping_neg(),
            /* fixed */ _ => 0,
        };

        if word_size == 4 {
            for _ in 0..count {
                let w = sb.read_32(self.internal.src_addr & !3);
                sb.write_32(self.internal.dst_addr & !3, w);
                self.internal.src_addr = self.internal.src_addr.wrapping_add(src_adj);
                self.internal.dst_addr = self.internal.dst_addr.wrapping_add(dst_adj);
            }
        } else {
            for _ in 0..count {
                let hw = sb.read_16(self.internal.src_addr & !1);
                sb.write_16(self.internal.dst_addr & !1, hw);
                self.internal.src_addr = self.internal.src_addr.wrapping_add(src_adj);
                self.internal.dst_addr = self.internal.dst_addr.wrapping_add(dst_adj);
            }
        }

        if self.ctrl.is_triggering_irq() {
            interrupt::signal_irq(&self.interrupt_flags, self.irq);
        }

        if self.ctrl.repeat() {
            self.internal.count = self.wc;
            if self.ctrl.dst_adj() == 3 {
                self.internal.dst_addr = self.dst;
            }
        } else {
            self.ctrl.set_enabled(false);
        }

        2 * count as usize + 2
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DmaController {
    pub channels: [DmaChannel; 4],
    pending_set: u8,
}

impl InterruptConnect for DmaController {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags) {
        for channel in &mut self.channels {
            channel.interrupt_flags = interrupt_flags.clone();
        }
    }
}

impl DmaController {
    pub fn new(interrupt_flags: SharedInterruptFlags) -> DmaController {
        DmaController {
            channels: [
                DmaChannel::new(0, interrupt_flags.clone()),
                DmaChannel::new(1, interrupt_flags.clone()),
                DmaChannel::new(2, interrupt_flags.clone()),
                DmaChannel::new(3, interrupt_flags),
            ],
            pending_set: 0,
        }
    }

    pub fn reset(&mut self) {
        let flags = self.channels[0].interrupt_flags.clone();
        *self = DmaController::new(flags);
    }

    pub fn is_active(&self) -> bool {
        self.pending_set != 0
    }

    /// Run every pending channel to completion and return the consumed bus
    /// cycles; 0 means the CPU keeps the bus this tick.
    pub fn step(&mut self, sb: &mut SysBus) -> usize {
        let mut cycles = 0;
        for id in 0..4 {
            if self.pending_set & (1 << id) != 0 {
                cycles += self.channels[id].xfer(sb);
            }
        }
        self.pending_set = 0;
        cycles
    }

    pub fn write_16(&mut self, channel_id: usize, ofs: u32, value: u16) {
        match ofs {
            0 => self.channels[channel_id].write_src_low(value),
            2 => self.channels[channel_id].write_src_high(value),
            4 => self.channels[channel_id].write_dst_low(value),
            6 => self.channels[channel_id].write_dst_high(value),
            8 => self.channels[channel_id].write_word_count(value),
            10 => {
                if self.channels[channel_id].write_dma_ctrl(value) {
                    self.pending_set |= 1 << channel_id;
                } else if !self.channels[channel_id].ctrl.is_enabled() {
                    self.pending_set &= !(1 << channel_id);
                }
            }
            _ => warn!("invalid dma register offset {:#x}", ofs),
        }
    }

    pub fn handle_read_ctrl(&self, channel_id: usize) -> u16 {
        self.channels[channel_id].ctrl.0
    }

    fn notify(&mut self, timing: u16) {
        for i in 0..4 {
            if self.channels[i].ctrl.is_enabled() && self.channels[i].ctrl.timing() == timing {
                self.pending_set |= 1 << i;
            }
        }
    }

    pub fn notify_vblank(&mut self) {
        self.notify(TIMING_VBLANK);
    }

    pub fn notify_hblank(&mut self) {
        self.notify(TIMING_HBLANK);
    }
}
