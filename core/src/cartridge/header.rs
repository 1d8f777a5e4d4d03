use std::ops::Range;
use std::str::from_utf8;

use super::super::{AgbError, AgbResult};

/// Total size of the cartridge header at the start of every ROM image.
pub const HEADER_LEN: usize = 0xc0;

// Field layout within the header. The region in front of the title holds
// the entry branch and the compressed logo bitmap, neither of which the
// emulator needs to interpret.
const TITLE: Range<usize> = 0xa0..0xac;
const GAME_CODE: Range<usize> = 0xac..0xb0;
const MAKER_CODE: Range<usize> = 0xb0..0xb2;
const VERSION: usize = 0xbc;
const COMPLEMENT: usize = 0xbd;

/// The identifying fields of a game pak header: title, game code, maker
/// code, version, and the complement check byte guarding them.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CartridgeHeader {
    pub game_title: String,
    pub game_code: String,
    pub maker_code: String,
    pub software_version: u8,
    pub checksum: u8,
}

/// chk = -(sum of bytes a0h..bch) - 19h
fn complement_check(fields: &[u8]) -> u8 {
    let sum = fields.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum).wrapping_sub(0x19)
}

fn ascii_field(bytes: &[u8], range: Range<usize>, what: &str) -> AgbResult<String> {
    let text = from_utf8(&bytes[range])
        .map_err(|_| AgbError::CartridgeLoad(format!("{} field is not ascii", what)))?;
    Ok(text.trim_end_matches('\0').to_string())
}

impl CartridgeHeader {
    pub fn parse(bytes: &[u8]) -> AgbResult<CartridgeHeader> {
        if bytes.len() < HEADER_LEN {
            return Err(AgbError::CartridgeLoad(format!(
                "rom is {} bytes, shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let checksum = bytes[COMPLEMENT];
        let computed = complement_check(&bytes[TITLE.start..=VERSION]);
        if computed != checksum {
            warn!(
                "header complement check failed (computed {:02x}, header says {:02x})",
                computed, checksum
            );
        }

        Ok(CartridgeHeader {
            game_title: ascii_field(bytes, TITLE, "game title")?,
            game_code: ascii_field(bytes, GAME_CODE, "game code")?,
            maker_code: ascii_field(bytes, MAKER_CODE, "maker code")?,
            software_version: bytes[VERSION],
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rom() -> Vec<u8> {
        let mut rom = vec![0u8; HEADER_LEN];
        rom[TITLE].copy_from_slice(b"TESTING\0\0\0\0\0");
        rom[GAME_CODE].copy_from_slice(b"ATSE");
        rom[MAKER_CODE].copy_from_slice(b"01");
        rom[COMPLEMENT] = complement_check(&rom[TITLE.start..=VERSION]);
        rom
    }

    #[test]
    fn parses_title_and_code() {
        let rom = make_rom();
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.game_title, "TESTING");
        assert_eq!(header.game_code, "ATSE");
        assert_eq!(header.maker_code, "01");
    }

    #[test]
    fn rejects_short_rom() {
        assert!(CartridgeHeader::parse(&[0u8; HEADER_LEN - 1]).is_err());
    }

    #[test]
    fn non_ascii_title_is_an_error() {
        let mut rom = make_rom();
        rom[TITLE.start] = 0xff;
        assert!(CartridgeHeader::parse(&rom).is_err());
    }
}
