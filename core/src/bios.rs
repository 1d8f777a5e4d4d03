use arm7tdmi::{Addr, Arm7tdmiCore};

use agbemu_utils::WeakPointer;

use super::sysbus::{Bus, SysBus};

pub const BIOS_SIZE: usize = 16 * 1024;

/// Word the latch holds once the boot sequence has handed control to the
/// cartridge (the `subs pc, lr, #4` of the irq epilogue).
const POST_BOOT_LATCH: u32 = 0xe129_f000;

/// The system ROM region. The hardware guards it: while the program counter
/// is inside the region, fetches go through and refresh a one-word latch;
/// any read issued from outside only ever sees that latch.
pub struct Bios {
    rom: Box<[u8]>,
    fetch_latch: u32,
    /// Consulted for the program counter only
    cpu: WeakPointer<Arm7tdmiCore<SysBus>>,
}

impl Bios {
    pub fn new(rom: Box<[u8]>) -> Bios {
        Bios {
            rom,
            fetch_latch: POST_BOOT_LATCH,
            cpu: WeakPointer::default(),
        }
    }

    pub(super) fn connect_arm_core(&mut self, cpu: WeakPointer<Arm7tdmiCore<SysBus>>) {
        self.cpu = cpu;
    }

    #[inline]
    fn executing_inside(&self) -> bool {
        self.cpu.pc < BIOS_SIZE as u32
    }

    /// Slice the latched word down to the requested access, honoring the
    /// byte lanes the address would have selected.
    #[inline]
    fn latched(&self, addr: Addr, width: u32) -> u32 {
        let lane = addr & (4 - width);
        self.fetch_latch >> (lane * 8)
    }
}

impl Bus for Bios {
    #[inline]
    fn read_32(&mut self, addr: Addr) -> u32 {
        if self.executing_inside() {
            let ofs = addr as usize;
            let word = u32::from_le_bytes(self.rom[ofs..ofs + 4].try_into().unwrap());
            // word reads from in here are opcode fetches, keep the latch fresh
            self.fetch_latch = word;
            word
        } else {
            self.latched(addr, 4)
        }
    }

    #[inline]
    fn read_16(&mut self, addr: Addr) -> u16 {
        if self.executing_inside() {
            let ofs = addr as usize;
            u16::from_le_bytes(self.rom[ofs..ofs + 2].try_into().unwrap())
        } else {
            self.latched(addr, 2) as u16
        }
    }

    #[inline]
    fn read_8(&mut self, addr: Addr) -> u8 {
        if self.executing_inside() {
            self.rom[addr as usize]
        } else {
            self.latched(addr, 1) as u8
        }
    }

    #[inline]
    fn write_8(&mut self, _addr: Addr, _value: u8) {
        // read-only region
    }
}
