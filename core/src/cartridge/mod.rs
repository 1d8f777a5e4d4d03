use arm7tdmi::Addr;

use super::sysbus::Bus;
use super::AgbResult;

pub mod header;
mod loader;

pub use header::CartridgeHeader;

/// The game pak. The ROM format is opaque apart from the 0xC0-byte header;
/// backup media is not modeled.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    #[serde(skip)]
    bytes: Box<[u8]>,
    size: usize,
}

impl Cartridge {
    /// Build a cartridge from a raw image or a zip archive containing one.
    /// Images shorter than the cartridge header are rejected.
    pub fn from_bytes(bytes: &[u8]) -> AgbResult<Cartridge> {
        let rom = loader::load_from_bytes(bytes)?;
        let header = CartridgeHeader::parse(&rom)?;
        info!(
            "loaded rom: {} ({}), {} bytes",
            header.game_title,
            header.game_code,
            rom.len()
        );
        Ok(Cartridge {
            header,
            size: rom.len(),
            bytes: rom,
        })
    }

    pub fn set_rom_bytes(&mut self, bytes: Box<[u8]>) {
        self.size = bytes.len();
        self.bytes = bytes;
    }

    pub fn get_rom_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Bus for Cartridge {
    fn read_8(&mut self, addr: Addr) -> u8 {
        let ofs = addr as usize;
        if ofs < self.size {
            self.bytes[ofs]
        } else {
            // out-of-bounds gamepak reads return the address bus pattern
            ((addr >> 1) >> ((addr & 1) << 3)) as u8
        }
    }

    fn write_8(&mut self, _addr: Addr, _value: u8) {
        // the rom is read-only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rom_without_full_header() {
        assert!(Cartridge::from_bytes(&[0u8; 0x40]).is_err());
    }

    #[test]
    fn out_of_bounds_reads_follow_address_pattern() {
        let mut cart = Cartridge::default();
        assert_eq!(cart.read_16(0x100), (0x100 >> 1) as u16);
    }
}
