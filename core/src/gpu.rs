use super::dma::DmaController;
use super::interrupt::{self, Interrupt, InterruptConnect, SharedInterruptFlags};

pub const DISPLAY_WIDTH: usize = 240;
pub const DISPLAY_HEIGHT: usize = 160;
pub const VBLANK_LINES: usize = 68;

pub const CYCLES_HDRAW: usize = 960;
pub const CYCLES_HBLANK: usize = 272;
pub const CYCLES_SCANLINE: usize = 1232;
pub const CYCLES_FULL_REFRESH: usize = 280_896;

#[derive(Serialize, Deserialize, Debug, PartialEq, Copy, Clone)]
pub enum GpuState {
    HDraw,
    HBlank,
    VBlank,
}

impl Default for GpuState {
    fn default() -> GpuState {
        GpuState::HDraw
    }
}
use GpuState::*;

bitfield! {
    #[derive(Serialize, Deserialize, Default, Copy, Clone)]
    pub struct DisplayControl(u16);
    impl Debug;
    u16;
    pub mode, set_mode: 2, 0;
    pub display_frame, _: 4;
    pub hblank_interval_free, _: 5;
    pub obj_character_vram_mapping, _: 6;
    pub forced_blank, _: 7;
}

bitfield! {
    #[derive(Serialize, Deserialize, Default, Copy, Clone)]
    pub struct DisplayStatus(u16);
    impl Debug;
    u16;
    pub get_vblank_flag, set_vblank_flag: 0;
    pub get_hblank_flag, set_hblank_flag: 1;
    pub get_vcount_flag, set_vcount_flag: 2;
    pub vblank_irq_enable, _: 3;
    pub hblank_irq_enable, _: 4;
    pub vcount_irq_enable, _: 5;
    pub vcount_setting, _: 15, 8;
}

/// The LCD timing engine. It walks the HDraw/HBlank/VBlank schedule, keeps
/// DISPSTAT/VCOUNT truthful, raises the video interrupts and kicks the
/// video-timed DMA channels. Actual scanline rendering is not modeled; the
/// frame buffer stays blank.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Gpu {
    pub state: GpuState,
    /// cycles left until the current state completes
    cycles_left_for_current_state: usize,

    pub vcount: usize,
    pub dispcnt: DisplayControl,
    pub dispstat: DisplayStatus,

    /// Set when a vblank is entered, cleared by the frame loop.
    pub frame_ready: bool,

    frame_buffer: Vec<u32>,

    #[serde(skip)]
    interrupt_flags: SharedInterruptFlags,
}

impl InterruptConnect for Gpu {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags) {
        self.interrupt_flags = interrupt_flags;
    }
}

impl Gpu {
    pub fn new(interrupt_flags: SharedInterruptFlags) -> Gpu {
        Gpu {
            state: HDraw,
            cycles_left_for_current_state: CYCLES_HDRAW,
            vcount: 0,
            dispcnt: DisplayControl(0x80),
            dispstat: DisplayStatus(0),
            frame_ready: false,
            frame_buffer: vec![0; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            interrupt_flags,
        }
    }

    pub fn reset(&mut self) {
        self.state = HDraw;
        self.cycles_left_for_current_state = CYCLES_HDRAW;
        self.vcount = 0;
        self.dispcnt = DisplayControl(0x80);
        self.dispstat = DisplayStatus(0);
        self.frame_ready = false;
    }

    pub fn get_frame_buffer(&self) -> &[u32] {
        &self.frame_buffer
    }

    fn update_vcount(&mut self, value: usize) {
        self.vcount = value;
        let vcount_setting = self.dispstat.vcount_setting();
        self.dispstat
            .set_vcount_flag(vcount_setting == self.vcount as u16);

        if self.dispstat.vcount_irq_enable() && self.dispstat.get_vcount_flag() {
            interrupt::signal_irq(&self.interrupt_flags, Interrupt::LCD_VCounterMatch);
        }
    }

    fn on_state_completed(&mut self, completed: GpuState, dmac: &mut DmaController) {
        match completed {
            HDraw => {
                self.state = HBlank;
                self.cycles_left_for_current_state = CYCLES_HBLANK;
                self.dispstat.set_hblank_flag(true);

                if self.dispstat.hblank_irq_enable() {
                    interrupt::signal_irq(&self.interrupt_flags, Interrupt::LCD_HBlank);
                }
                dmac.notify_hblank();
            }
            HBlank => {
                self.update_vcount(self.vcount + 1);

                if self.vcount < DISPLAY_HEIGHT {
                    self.state = HDraw;
                    self.dispstat.set_hblank_flag(false);
                    self.cycles_left_for_current_state = CYCLES_HDRAW;
                } else {
                    self.state = VBlank;
                    self.dispstat.set_vblank_flag(true);
                    self.dispstat.set_hblank_flag(false);

                    if self.dispstat.vblank_irq_enable() {
                        interrupt::signal_irq(&self.interrupt_flags, Interrupt::LCD_VBlank);
                    }
                    dmac.notify_vblank();
                    self.frame_ready = true;
                    self.cycles_left_for_current_state = CYCLES_SCANLINE;
                }
            }
            VBlank => {
                if self.vcount < DISPLAY_HEIGHT + VBLANK_LINES - 1 {
                    self.update_vcount(self.vcount + 1);
                    self.cycles_left_for_current_state = CYCLES_SCANLINE;
                } else {
                    self.update_vcount(0);
                    self.state = HDraw;
                    self.dispstat.set_vblank_flag(false);
                    self.cycles_left_for_current_state = CYCLES_HDRAW;
                }
            }
        }
    }

    /// Advance the LCD schedule by the given number of bus cycles.
    pub fn step(&mut self, mut cycles: usize, dmac: &mut DmaController) {
        while cycles > 0 {
            if cycles < self.cycles_left_for_current_state {
                self.cycles_left_for_current_state -= cycles;
                break;
            }
            cycles -= self.cycles_left_for_current_state;
            self.on_state_completed(self.state, dmac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::IrqBitmask;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_gpu() -> (Gpu, SharedInterruptFlags, DmaController) {
        let flags: SharedInterruptFlags = Rc::new(Cell::new(IrqBitmask(0)));
        let gpu = Gpu::new(flags.clone());
        let dmac = DmaController::new(flags.clone());
        (gpu, flags, dmac)
    }

    #[test]
    fn scanline_timing() {
        let (mut gpu, _flags, mut dmac) = make_gpu();
        gpu.step(CYCLES_HDRAW, &mut dmac);
        assert_eq!(gpu.state, GpuState::HBlank);
        assert!(gpu.dispstat.get_hblank_flag());

        gpu.step(CYCLES_HBLANK, &mut dmac);
        assert_eq!(gpu.state, GpuState::HDraw);
        assert_eq!(gpu.vcount, 1);
    }

    #[test]
    fn frame_ready_after_full_refresh() {
        let (mut gpu, _flags, mut dmac) = make_gpu();
        let mut cycles = 0;
        while !gpu.frame_ready {
            gpu.step(16, &mut dmac);
            cycles += 16;
        }
        // vblank starts after 160 visible scanlines
        assert_eq!(gpu.vcount, DISPLAY_HEIGHT);
        assert!(gpu.dispstat.get_vblank_flag());
        assert!((cycles - CYCLES_SCANLINE * DISPLAY_HEIGHT) < 32);

        // and the schedule wraps around to line 0
        gpu.frame_ready = false;
        for _ in 0..(VBLANK_LINES * CYCLES_SCANLINE / 16) {
            gpu.step(16, &mut dmac);
        }
        assert_eq!(gpu.state, GpuState::HDraw);
        assert_eq!(gpu.vcount, 0);
    }

    #[test]
    fn vblank_irq_raised_when_enabled() {
        let (mut gpu, flags, mut dmac) = make_gpu();
        gpu.dispstat.0 |= 1 << 3; // vblank irq enable
        for _ in 0..DISPLAY_HEIGHT {
            gpu.step(CYCLES_SCANLINE, &mut dmac);
        }
        assert!(flags.get().LCD_VBlank());
    }
}
