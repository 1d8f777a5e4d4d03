use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use arm7tdmi::memory::MemoryInterface;
use arm7tdmi::{Addr, Arm7tdmiCore};

use agbemu_utils::{Shared, WeakPointer};

use super::bios::Bios;
use super::cartridge::Cartridge;
use super::iodev::IoDevices;

pub const WORK_RAM_SIZE: usize = 256 * 1024;
pub const INTERNAL_RAM_SIZE: usize = 32 * 1024;
pub const PALETTE_RAM_SIZE: usize = 1024;
pub const VIDEO_RAM_SIZE: usize = 128 * 1024;
pub const OAM_SIZE: usize = 1024;

pub const BIOS_ADDR: u32 = 0x0000_0000;
pub const EWRAM_ADDR: u32 = 0x0200_0000;
pub const IWRAM_ADDR: u32 = 0x0300_0000;
pub const IOMEM_ADDR: u32 = 0x0400_0000;
pub const PALRAM_ADDR: u32 = 0x0500_0000;
pub const VRAM_ADDR: u32 = 0x0600_0000;
pub const OAM_ADDR: u32 = 0x0700_0000;
pub const GAMEPAK_WS0_ADDR: u32 = 0x0800_0000;
pub const GAMEPAK_WS1_ADDR: u32 = 0x0a00_0000;
pub const GAMEPAK_WS2_ADDR: u32 = 0x0c00_0000;

/// Byte-level backend for a region of the address space. 16/32-bit accesses
/// compose little-endian by default; backends with a natural wider access
/// override them.
pub trait Bus {
    fn read_8(&mut self, addr: Addr) -> u8;

    fn write_8(&mut self, addr: Addr, value: u8);

    fn read_16(&mut self, addr: Addr) -> u16 {
        self.read_8(addr) as u16 | (self.read_8(addr + 1) as u16) << 8
    }

    fn read_32(&mut self, addr: Addr) -> u32 {
        self.read_16(addr) as u32 | (self.read_16(addr + 2) as u32) << 16
    }

    fn write_16(&mut self, addr: Addr, value: u16) {
        self.write_8(addr, (value & 0xff) as u8);
        self.write_8(addr + 1, ((value >> 8) & 0xff) as u8);
    }

    fn write_32(&mut self, addr: Addr, value: u32) {
        self.write_16(addr, (value & 0xffff) as u16);
        self.write_16(addr + 2, ((value >> 16) & 0xffff) as u16);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BoxedMemory {
    pub mem: Box<[u8]>,
}

impl BoxedMemory {
    pub fn new(boxed_slice: Box<[u8]>) -> BoxedMemory {
        BoxedMemory { mem: boxed_slice }
    }
}

impl Bus for BoxedMemory {
    #[inline]
    fn read_8(&mut self, addr: Addr) -> u8 {
        self.mem[addr as usize]
    }

    #[inline]
    fn write_8(&mut self, addr: Addr, value: u8) {
        self.mem[addr as usize] = value;
    }

    #[inline]
    fn read_16(&mut self, addr: Addr) -> u16 {
        (&self.mem[addr as usize..]).read_u16::<LittleEndian>().unwrap()
    }

    #[inline]
    fn read_32(&mut self, addr: Addr) -> u32 {
        (&self.mem[addr as usize..]).read_u32::<LittleEndian>().unwrap()
    }

    #[inline]
    fn write_16(&mut self, addr: Addr, value: u16) {
        (&mut self.mem[addr as usize..])
            .write_u16::<LittleEndian>(value)
            .unwrap()
    }

    #[inline]
    fn write_32(&mut self, addr: Addr, value: u32) {
        (&mut self.mem[addr as usize..])
            .write_u32::<LittleEndian>(value)
            .unwrap()
    }
}

/// Unmapped address space. Reads yield zero, which stands in for the open
/// bus value; writes vanish.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct DummyBus;

impl Bus for DummyBus {
    fn read_8(&mut self, _addr: Addr) -> u8 {
        0
    }

    fn write_8(&mut self, _addr: Addr, _value: u8) {}
}

pub struct SysBus {
    pub io: Shared<IoDevices>,

    bios: Bios,
    ewram: BoxedMemory,
    iwram: BoxedMemory,
    pub palette_ram: BoxedMemory,
    pub vram: BoxedMemory,
    pub oam: BoxedMemory,
    pub cartridge: Cartridge,
    dummy: DummyBus,
}

impl SysBus {
    pub fn new(io: Shared<IoDevices>, bios_rom: Box<[u8]>, cartridge: Cartridge) -> SysBus {
        SysBus {
            io,
            bios: Bios::new(bios_rom),
            ewram: BoxedMemory::new(vec![0; WORK_RAM_SIZE].into_boxed_slice()),
            iwram: BoxedMemory::new(vec![0; INTERNAL_RAM_SIZE].into_boxed_slice()),
            palette_ram: BoxedMemory::new(vec![0; PALETTE_RAM_SIZE].into_boxed_slice()),
            vram: BoxedMemory::new(vec![0; VIDEO_RAM_SIZE].into_boxed_slice()),
            oam: BoxedMemory::new(vec![0; OAM_SIZE].into_boxed_slice()),
            cartridge,
            dummy: DummyBus,
        }
    }

    /// Hook the CPU back-reference used for the BIOS read protection.
    pub fn init(&mut self, cpu: WeakPointer<Arm7tdmiCore<SysBus>>) {
        self.bios.connect_arm_core(cpu);
    }

    pub fn get_ewram(&self) -> &[u8] {
        &self.ewram.mem
    }

    pub fn get_iwram(&self) -> &[u8] {
        &self.iwram.mem
    }

    pub fn set_ewram(&mut self, buffer: Box<[u8]>) {
        self.ewram = BoxedMemory::new(buffer);
    }

    pub fn set_iwram(&mut self, buffer: Box<[u8]>) {
        self.iwram = BoxedMemory::new(buffer);
    }

    fn map_mut(&mut self, addr: Addr) -> (&mut dyn Bus, Addr) {
        let ofs = addr & 0x00ff_ffff;
        match addr & 0xff00_0000 {
            BIOS_ADDR => {
                if ofs >= 0x4000 {
                    (&mut self.dummy, ofs)
                } else {
                    (&mut self.bios, ofs)
                }
            }
            EWRAM_ADDR => (&mut self.ewram, ofs & 0x3_ffff),
            IWRAM_ADDR => (&mut self.iwram, ofs & 0x7fff),
            PALRAM_ADDR => (&mut self.palette_ram, ofs & 0x3ff),
            VRAM_ADDR => (&mut self.vram, {
                let mut ofs = ofs & ((VIDEO_RAM_SIZE as u32) - 1);
                if ofs >= 0x18000 {
                    ofs -= 0x8000;
                }
                ofs
            }),
            OAM_ADDR => (&mut self.oam, ofs & 0x3ff),
            GAMEPAK_WS0_ADDR | 0x0900_0000 | GAMEPAK_WS1_ADDR | 0x0b00_0000
            | GAMEPAK_WS2_ADDR | 0x0d00_0000 => (&mut self.cartridge, addr & 0x01ff_ffff),
            _ => (&mut self.dummy, ofs),
        }
    }

    /// IO registers are 16 bits wide; mirror handling follows the hardware's
    /// sparse decode.
    #[inline]
    fn io_addr(addr: Addr) -> Addr {
        let ofs = addr & 0x00ff_ffff;
        IOMEM_ADDR
            + if ofs & 0xffff == 0x8000 {
                0x800
            } else {
                ofs & 0x7ff
            }
    }

    #[inline]
    fn is_io(addr: Addr) -> bool {
        addr & 0xff00_0000 == IOMEM_ADDR
    }
}

impl MemoryInterface for SysBus {
    fn read_8(&mut self, addr: Addr) -> u8 {
        if Self::is_io(addr) {
            let value = self.io.handle_read_16(Self::io_addr(addr) & !1);
            (value >> ((addr & 1) << 3)) as u8
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.read_8(ofs)
        }
    }

    fn read_16(&mut self, addr: Addr) -> u16 {
        if Self::is_io(addr) {
            self.io.handle_read_16(Self::io_addr(addr))
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.read_16(ofs)
        }
    }

    fn read_32(&mut self, addr: Addr) -> u32 {
        if Self::is_io(addr) {
            let io_addr = Self::io_addr(addr);
            self.io.handle_read_16(io_addr) as u32
                | (self.io.handle_read_16(io_addr + 2) as u32) << 16
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.read_32(ofs)
        }
    }

    fn write_8(&mut self, addr: Addr, value: u8) {
        if Self::is_io(addr) {
            self.io.handle_write_8(Self::io_addr(addr), value);
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.write_8(ofs, value);
        }
    }

    fn write_16(&mut self, addr: Addr, value: u16) {
        if Self::is_io(addr) {
            self.io.handle_write_16(Self::io_addr(addr), value);
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.write_16(ofs, value);
        }
    }

    fn write_32(&mut self, addr: Addr, value: u32) {
        if Self::is_io(addr) {
            let io_addr = Self::io_addr(addr);
            self.io.handle_write_16(io_addr, (value & 0xffff) as u16);
            self.io
                .handle_write_16(io_addr + 2, ((value >> 16) & 0xffff) as u16);
        } else {
            let (dev, ofs) = self.map_mut(addr);
            dev.write_32(ofs, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::iodev::IoDevices;
    use crate::interrupt::IrqBitmask;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_sysbus() -> SysBus {
        let flags = Rc::new(Cell::new(IrqBitmask(0)));
        let io = Shared::new(IoDevices::new_with_flags(flags));
        SysBus::new(
            io,
            vec![0; 0x4000].into_boxed_slice(),
            Cartridge::default(),
        )
    }

    #[test]
    fn ram_mirroring() {
        let mut bus = make_sysbus();
        bus.write_32(0x0200_0000, 0xdead_beef);
        assert_eq!(bus.read_32(0x0204_0000), 0xdead_beef); // 256k mirror

        bus.write_32(0x0300_0000, 0xcafe_babe);
        assert_eq!(bus.read_32(0x0300_8000), 0xcafe_babe); // 32k mirror
    }

    #[test]
    fn unmapped_reads_zero() {
        let mut bus = make_sysbus();
        assert_eq!(bus.read_32(0x0f00_0000), 0);
    }

    #[test]
    fn vram_mirror_fold() {
        let mut bus = make_sysbus();
        bus.write_16(0x0601_0000, 0x1234);
        assert_eq!(bus.read_16(0x0601_8000), 0x1234); // 0x18000.. folds back
    }
}
