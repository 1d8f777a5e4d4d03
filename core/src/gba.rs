use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use arm7tdmi::Arm7tdmiCore;

use agbemu_utils::Shared;

use super::cartridge::Cartridge;
use super::interrupt::{InterruptConnect, IrqBitmask, SharedInterruptFlags};
use super::iodev::{HaltState, IoDevices};
use super::keypad::Keys;
use super::sysbus::SysBus;

use bit::BitIndex;

/// Checks if the bios provided is the real one
fn check_real_bios(bios: &[u8]) -> bool {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.input(bios);
    let digest = hasher.result();

    let expected_hash = hex!("fd2547724b505f487e6dcb29ec2ecff3af35a841a77ab2e85fd87350abd36570");

    digest.as_slice() == &expected_hash[..]
}

/// The whole console: the CPU core, the bus, and the peripherals, advanced
/// together by a cooperative tick loop.
pub struct GameBoyAdvance {
    pub cpu: Box<Arm7tdmiCore<SysBus>>,
    pub sysbus: Shared<SysBus>,
    pub io_devs: Shared<IoDevices>,

    interrupt_flags: SharedInterruptFlags,

    /// Total bus cycles since power-on
    pub total_cycles: usize,
}

#[derive(Serialize, Deserialize)]
struct SaveState {
    cpu_state: arm7tdmi::SavedCpuState,
    io_devs: IoDevices,
    ewram: Box<[u8]>,
    iwram: Box<[u8]>,
    interrupt_flags: u16,
    total_cycles: usize,
}

impl GameBoyAdvance {
    pub fn new(bios_rom: Box<[u8]>, gamepak: Cartridge) -> GameBoyAdvance {
        match check_real_bios(&bios_rom) {
            true => info!("verified bios rom"),
            false => warn!("this is not the real bios rom, some games may not be compatible"),
        };

        let interrupt_flags: SharedInterruptFlags = Rc::new(Cell::new(IrqBitmask(0)));
        let io_devs = Shared::new(IoDevices::new_with_flags(interrupt_flags.clone()));
        let sysbus = Shared::new(SysBus::new(io_devs.clone(), bios_rom, gamepak));

        let mut cpu = Box::new(Arm7tdmiCore::new(sysbus.clone()));
        cpu.reset();

        let mut gba = GameBoyAdvance {
            cpu,
            sysbus,
            io_devs,
            interrupt_flags,
            total_cycles: 0,
        };

        gba.sysbus.init(gba.cpu.weak_ptr());

        gba
    }

    pub fn get_game_title(&self) -> String {
        self.sysbus.cartridge.header.game_title.clone()
    }

    pub fn get_game_code(&self) -> String {
        self.sysbus.cartridge.header.game_code.clone()
    }

    pub fn set_key_state(&mut self, key: Keys, pressed: bool) {
        // KEYINPUT is active-low
        let mut keyinput = self.io_devs.keyinput;
        keyinput.set_bit(key as usize, !pressed);
        self.io_devs.keyinput = keyinput;
    }

    pub fn get_frame_buffer(&self) -> &[u32] {
        self.io_devs.gpu.get_frame_buffer()
    }

    pub fn get_samples(&mut self, count: usize) -> Vec<i16> {
        self.io_devs.sound.get_samples(count)
    }

    #[inline]
    fn cpu_interrupt(&mut self) {
        self.cpu.irq();
        // any served interrupt releases the low-power state
        self.cpu.halted = false;
        self.io_devs.haltcnt = HaltState::Running;
    }

    #[inline]
    fn cpu_step(&mut self) -> usize {
        if self.io_devs.intc.irq_pending() {
            self.cpu_interrupt();
        }
        let cycles = self.cpu.step();

        // a HALTCNT write during the executed instruction parks the core
        match self.io_devs.haltcnt {
            HaltState::Running => {}
            HaltState::Halt => self.cpu.halted = true,
            HaltState::Stop => {
                self.cpu.halted = true;
                self.cpu.stopped = true;
            }
        }
        cycles
    }

    /// One arbitration round: DMA owns the bus when it has pending work,
    /// otherwise the CPU runs one instruction; the consumed cycles then
    /// drive the video, audio and timer units, in that order.
    pub fn single_step(&mut self) -> usize {
        let mut cycles = self.io_devs.dmac.step(&mut self.sysbus);
        if cycles == 0 {
            cycles = self.cpu_step();
        }

        let io = &mut *self.io_devs;
        io.gpu.step(cycles, &mut io.dmac);
        io.sound.step(cycles);
        io.timers.step(cycles);

        self.total_cycles += cycles;
        cycles
    }

    /// Advance the emulation for one frame worth of time (280 896 cycles).
    pub fn frame(&mut self) {
        self.io_devs.gpu.frame_ready = false;
        while !self.io_devs.gpu.frame_ready {
            self.single_step();
        }
    }

    pub fn save_state(&self) -> bincode::Result<Vec<u8>> {
        let s = SaveState {
            cpu_state: self.cpu.save_state(),
            io_devs: self.io_devs.clone_inner(),
            ewram: Box::from(self.sysbus.get_ewram()),
            iwram: Box::from(self.sysbus.get_iwram()),
            interrupt_flags: self.interrupt_flags.get().value(),
            total_cycles: self.total_cycles,
        };

        bincode::serialize(&s)
    }

    pub fn restore_state(&mut self, bytes: &[u8]) -> bincode::Result<()> {
        let decoded: Box<SaveState> = bincode::deserialize_from(bytes)?;

        self.cpu.restore_state(decoded.cpu_state);
        self.interrupt_flags
            .set(IrqBitmask(decoded.interrupt_flags));
        *self.io_devs = decoded.io_devs;
        self.io_devs.connect_irq(self.interrupt_flags.clone());
        self.sysbus.set_ewram(decoded.ewram);
        self.sysbus.set_iwram(decoded.iwram);
        self.total_cycles = decoded.total_cycles;

        Ok(())
    }

    /// Reset the console back to the post-BIOS boot state.
    pub fn soft_reset(&mut self) {
        self.cpu.reset();
        let io = &mut *self.io_devs;
        io.gpu.reset();
        io.sound.reset();
        io.timers.reset();
        io.dmac.reset();
        io.haltcnt = HaltState::Running;
        self.interrupt_flags.set(IrqBitmask(0));
        self.total_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{CYCLES_SCANLINE, DISPLAY_HEIGHT};
    use crate::iodev::consts::*;
    use crate::keypad::KEYINPUT_ALL_RELEASED;

    use arm7tdmi::memory::MemoryInterface;
    use arm7tdmi::CpuMode;

    fn make_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x200];
        // entry point: an idle loop (b .)
        rom[..4].copy_from_slice(&0xeafffffe_u32.to_le_bytes());
        rom
    }

    fn make_gba() -> GameBoyAdvance {
        let bios = vec![0; 0x4000].into_boxed_slice();
        let cartridge = Cartridge::from_bytes(&make_rom()).unwrap();
        GameBoyAdvance::new(bios, cartridge)
    }

    #[test]
    fn frame_reaches_vblank() {
        let mut gba = make_gba();
        gba.frame();
        assert!(gba.total_cycles >= CYCLES_SCANLINE * DISPLAY_HEIGHT);
        assert_eq!(gba.io_devs.gpu.vcount, DISPLAY_HEIGHT);
        // the cpu kept spinning on its idle loop
        assert_eq!(gba.cpu.pc, 0x0800_0000);
    }

    #[test]
    fn key_state_is_active_low() {
        let mut gba = make_gba();
        assert_eq!(gba.io_devs.keyinput, KEYINPUT_ALL_RELEASED);

        gba.set_key_state(Keys::ButtonA, true);
        let keyinput = gba.sysbus.read_16(REG_KEYINPUT);
        assert_eq!(keyinput & 1, 0);

        gba.set_key_state(Keys::ButtonA, false);
        let keyinput = gba.sysbus.read_16(REG_KEYINPUT);
        assert_eq!(keyinput & 1, 1);
    }

    #[test]
    fn haltcnt_parks_the_cpu_until_irq() {
        let mut gba = make_gba();
        gba.sysbus.write_8(REG_HALTCNT, 0);
        gba.single_step();
        assert!(gba.cpu.halted);

        // vblank irq wakes it up
        gba.cpu.cpsr.set_irq_disabled(false);
        gba.sysbus.write_16(REG_IME, 1);
        gba.sysbus.write_16(REG_IE, 1);
        gba.sysbus.write_16(REG_DISPSTAT, 1 << 3);
        gba.frame();
        // the irq raised at vblank is delivered on the next tick
        gba.single_step();
        assert!(!gba.cpu.halted);
        assert_eq!(gba.cpu.cpsr.mode(), CpuMode::Irq);
    }

    #[test]
    fn vblank_interrupt_enters_irq_mode() {
        let mut gba = make_gba();
        gba.cpu.cpsr.set_irq_disabled(false);
        gba.sysbus.write_16(REG_IME, 1);
        gba.sysbus.write_16(REG_IE, 1); // vblank
        gba.sysbus.write_16(REG_DISPSTAT, 1 << 3);

        gba.frame();
        // the irq raised at vblank is delivered on the next tick
        gba.single_step();

        assert_eq!(gba.cpu.cpsr.mode(), CpuMode::Irq);
        assert!(gba.cpu.cpsr.irq_disabled());
        // executing from the irq vector now
        assert!(gba.cpu.pc < 0x4000);
    }

    #[test]
    fn savestate_roundtrip() {
        let mut gba = make_gba();
        for _ in 0..100 {
            gba.single_step();
        }
        gba.sysbus.write_32(0x0200_0000, 0x1234_5678);
        let cycles = gba.total_cycles;
        let state = gba.save_state().unwrap();

        let mut other = make_gba();
        other.restore_state(&state).unwrap();
        assert_eq!(other.total_cycles, cycles);
        assert_eq!(other.cpu.pc, gba.cpu.pc);
        assert_eq!(other.sysbus.read_32(0x0200_0000), 0x1234_5678);
    }

    #[test]
    fn dma_blocks_cpu_for_its_cycles() {
        let mut gba = make_gba();
        let pc_before = gba.cpu.pc;

        // immediate 4-word dma via the io registers
        gba.sysbus.write_32(DMA_BASE + 12 * 3, 0x0200_0000);
        gba.sysbus.write_32(DMA_BASE + 12 * 3 + 4, 0x0300_0000);
        gba.sysbus.write_16(DMA_BASE + 12 * 3 + 8, 4);
        gba.sysbus
            .write_16(DMA_BASE + 12 * 3 + 10, (1 << 15) | (1 << 10));

        let cycles = gba.single_step();
        assert!(cycles >= 8);
        // the cpu did not run this tick
        assert_eq!(gba.cpu.pc, pc_before);
    }
}
