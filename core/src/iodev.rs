use arm7tdmi::Addr;

use super::dma::DmaController;
use super::gpu::{DisplayControl, Gpu};
use super::interrupt::{InterruptConnect, InterruptController, IrqBitmask, SharedInterruptFlags};
use super::keypad;
use super::sound::{SoundController, DEFAULT_SAMPLE_RATE};
use super::timer::Timers;

use consts::*;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum HaltState {
    Running,
    /// Lights out until an enabled interrupt fires
    Halt,
    /// Deeper than halt; this hardware revision has no exit path
    Stop,
}

/// The memory mapped peripherals, addressed through the IO region of the
/// bus as 16-bit registers.
#[derive(Serialize, Deserialize, Clone)]
pub struct IoDevices {
    pub intc: InterruptController,
    pub gpu: Gpu,
    pub sound: SoundController,
    pub timers: Timers,
    pub dmac: DmaController,

    pub keyinput: u16,
    pub waitcnt: u16,
    pub post_boot_flag: bool,
    pub haltcnt: HaltState,
}

impl InterruptConnect for IoDevices {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags) {
        self.intc.connect_irq(interrupt_flags.clone());
        self.gpu.connect_irq(interrupt_flags.clone());
        self.timers.connect_irq(interrupt_flags.clone());
        self.dmac.connect_irq(interrupt_flags);
    }
}

impl IoDevices {
    pub fn new(
        intc: InterruptController,
        gpu: Gpu,
        sound: SoundController,
        timers: Timers,
        dmac: DmaController,
    ) -> IoDevices {
        IoDevices {
            intc,
            gpu,
            sound,
            timers,
            dmac,
            keyinput: keypad::KEYINPUT_ALL_RELEASED,
            waitcnt: 0,
            post_boot_flag: false,
            haltcnt: HaltState::Running,
        }
    }

    /// Convenience constructor wiring every peripheral to the same IF latch.
    pub fn new_with_flags(interrupt_flags: SharedInterruptFlags) -> IoDevices {
        IoDevices::new(
            InterruptController::new(interrupt_flags.clone()),
            Gpu::new(interrupt_flags.clone()),
            SoundController::new(DEFAULT_SAMPLE_RATE),
            Timers::new(interrupt_flags.clone()),
            DmaController::new(interrupt_flags),
        )
    }

    pub fn handle_read_16(&mut self, io_addr: Addr) -> u16 {
        match io_addr {
            REG_DISPCNT => self.gpu.dispcnt.0,
            REG_DISPSTAT => self.gpu.dispstat.0,
            REG_VCOUNT => self.gpu.vcount as u16,

            REG_SOUNDCNT_X => self.sound.read_soundcnt_x(),
            REG_SOUNDBIAS => self.sound.soundbias,

            REG_DMA0CNT_H => self.dmac.handle_read_ctrl(0),
            REG_DMA1CNT_H => self.dmac.handle_read_ctrl(1),
            REG_DMA2CNT_H => self.dmac.handle_read_ctrl(2),
            REG_DMA3CNT_H => self.dmac.handle_read_ctrl(3),

            REG_TM0CNT_L..=REG_TM3CNT_H => self.timers.handle_read(io_addr),

            REG_KEYINPUT => self.keyinput,

            REG_IE => self.intc.interrupt_enable.value(),
            REG_IF => self.intc.read_interrupt_flags(),
            REG_WAITCNT => self.waitcnt,
            REG_IME => self.intc.interrupt_master_enable as u16,

            REG_POSTFLG => self.post_boot_flag as u16,

            _ => {
                trace!("unhandled io read at {:#010x}", io_addr);
                0
            }
        }
    }

    pub fn handle_write_16(&mut self, io_addr: Addr, value: u16) {
        match io_addr {
            REG_DISPCNT => self.gpu.dispcnt = DisplayControl(value),
            // the low three bits of DISPSTAT are hardware status, read-only
            REG_DISPSTAT => self.gpu.dispstat.0 = (value & !7) | (self.gpu.dispstat.0 & 7),

            REG_SOUNDCNT_X => self.sound.write_soundcnt_x(value),
            REG_SOUNDBIAS => self.sound.soundbias = value,

            DMA_BASE..=REG_DMA3CNT_H => {
                let ofs = io_addr - DMA_BASE;
                let channel_id = (ofs / 12) as usize;
                self.dmac.write_16(channel_id, ofs % 12, value);
            }

            REG_TM0CNT_L..=REG_TM3CNT_H => self.timers.handle_write(io_addr, value),

            REG_KEYINPUT => { /* read-only */ }

            REG_IE => self.intc.interrupt_enable = IrqBitmask(value),
            REG_IF => self.intc.write_interrupt_flags(value),
            REG_WAITCNT => self.waitcnt = value,
            REG_IME => self.intc.interrupt_master_enable = value & 1 != 0,

            REG_POSTFLG => {
                // POSTFLG in the low byte, HALTCNT in the high byte
                self.post_boot_flag = value & 1 != 0;
                self.write_haltcnt((value >> 8) as u8);
            }

            _ => {
                trace!(
                    "unhandled io write at {:#010x} (value={:#06x})",
                    io_addr,
                    value
                );
            }
        }
    }

    /// Byte-granular IO access. Most registers behave as halves of their
    /// 16-bit home, but POSTFLG/HALTCNT are true byte registers and a
    /// read-modify-write would wrongly re-trigger the halt.
    pub fn handle_write_8(&mut self, io_addr: Addr, value: u8) {
        match io_addr {
            REG_POSTFLG => self.post_boot_flag = value & 1 != 0,
            REG_HALTCNT => self.write_haltcnt(value),
            _ => {
                let aligned = io_addr & !1;
                let old = self.handle_read_16(aligned);
                let new = if io_addr & 1 == 1 {
                    (old & 0x00ff) | ((value as u16) << 8)
                } else {
                    (old & 0xff00) | value as u16
                };
                self.handle_write_16(aligned, new);
            }
        }
    }

    fn write_haltcnt(&mut self, value: u8) {
        if value & 0x80 != 0 {
            self.haltcnt = HaltState::Stop;
        } else {
            self.haltcnt = HaltState::Halt;
        }
    }
}

pub mod consts {
    use arm7tdmi::Addr;

    pub const REG_DISPCNT: Addr = 0x0400_0000; //  2  R/W  LCD Control
    pub const REG_DISPSTAT: Addr = 0x0400_0004; //  2  R/W  General LCD Status
    pub const REG_VCOUNT: Addr = 0x0400_0006; //  2  R    Vertical Counter

    pub const REG_SOUNDCNT_X: Addr = 0x0400_0084; //  2  R/W  Sound on/off
    pub const REG_SOUNDBIAS: Addr = 0x0400_0088; //  2  BIOS Sound PWM Control

    pub const DMA_BASE: Addr = 0x0400_00b0;
    pub const REG_DMA0CNT_H: Addr = 0x0400_00ba; //  2  R/W  DMA 0 Control
    pub const REG_DMA1CNT_H: Addr = 0x0400_00c6; //  2  R/W  DMA 1 Control
    pub const REG_DMA2CNT_H: Addr = 0x0400_00d2; //  2  R/W  DMA 2 Control
    pub const REG_DMA3CNT_H: Addr = 0x0400_00de; //  2  R/W  DMA 3 Control

    pub const REG_TM0CNT_L: Addr = 0x0400_0100; //  2  R/W  Timer 0 Counter/Reload
    pub const REG_TM0CNT_H: Addr = 0x0400_0102; //  2  R/W  Timer 0 Control
    pub const REG_TM1CNT_L: Addr = 0x0400_0104; //  2  R/W  Timer 1 Counter/Reload
    pub const REG_TM1CNT_H: Addr = 0x0400_0106; //  2  R/W  Timer 1 Control
    pub const REG_TM2CNT_L: Addr = 0x0400_0108; //  2  R/W  Timer 2 Counter/Reload
    pub const REG_TM2CNT_H: Addr = 0x0400_010a; //  2  R/W  Timer 2 Control
    pub const REG_TM3CNT_L: Addr = 0x0400_010c; //  2  R/W  Timer 3 Counter/Reload
    pub const REG_TM3CNT_H: Addr = 0x0400_010e; //  2  R/W  Timer 3 Control

    pub const REG_KEYINPUT: Addr = 0x0400_0130; //  2  R    Key Status

    pub const REG_IE: Addr = 0x0400_0200; //  2  R/W  Interrupt Enable
    pub const REG_IF: Addr = 0x0400_0202; //  2  R/W  Interrupt Request / Acknowledge
    pub const REG_WAITCNT: Addr = 0x0400_0204; //  2  R/W  Game Pak Waitstate Control
    pub const REG_IME: Addr = 0x0400_0208; //  2  R/W  Interrupt Master Enable

    pub const REG_POSTFLG: Addr = 0x0400_0300; //  1  R/W  Post Boot Flag
    pub const REG_HALTCNT: Addr = 0x0400_0301; //  1  W    Power Down Control
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_io() -> IoDevices {
        IoDevices::new_with_flags(Rc::new(Cell::new(IrqBitmask(0))))
    }

    #[test]
    fn dispstat_status_bits_are_read_only() {
        let mut io = make_io();
        io.gpu.dispstat.set_vblank_flag(true);
        io.handle_write_16(REG_DISPSTAT, 0);
        assert!(io.gpu.dispstat.get_vblank_flag());
    }

    #[test]
    fn haltcnt_byte_write_halts() {
        let mut io = make_io();
        io.handle_write_8(REG_HALTCNT, 0);
        assert_eq!(io.haltcnt, HaltState::Halt);

        let mut io = make_io();
        io.handle_write_8(REG_HALTCNT, 0x80);
        assert_eq!(io.haltcnt, HaltState::Stop);
    }

    #[test]
    fn postflg_byte_write_does_not_halt() {
        let mut io = make_io();
        io.handle_write_8(REG_POSTFLG, 1);
        assert!(io.post_boot_flag);
        assert_eq!(io.haltcnt, HaltState::Running);
    }

    #[test]
    fn ime_ie_roundtrip() {
        let mut io = make_io();
        io.handle_write_16(REG_IME, 1);
        io.handle_write_16(REG_IE, 0x1);
        assert_eq!(io.handle_read_16(REG_IME), 1);
        assert_eq!(io.handle_read_16(REG_IE), 1);
    }
}
