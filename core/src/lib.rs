#[macro_use]
extern crate serde;

#[macro_use]
extern crate enum_primitive_derive;

#[macro_use]
extern crate bitfield;

#[macro_use]
extern crate log;

#[macro_use]
extern crate hex_literal;

use std::error::Error;
use std::fmt;

pub use arm7tdmi;

mod bios;
pub mod cartridge;
pub mod dma;
pub mod gba;
pub mod gpu;
pub mod interrupt;
pub mod iodev;
pub mod keypad;
pub mod sound;
pub mod sysbus;
pub mod timer;

pub use gba::GameBoyAdvance;
pub use interrupt::{Interrupt, SharedInterruptFlags};
pub use sysbus::SysBus;

#[derive(Debug)]
pub enum AgbError {
    Io(::std::io::Error),
    CartridgeLoad(String),
}

impl fmt::Display for AgbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgbError::Io(e) => write!(f, "io error: {}", e),
            AgbError::CartridgeLoad(msg) => write!(f, "failed to load cartridge: {}", msg),
        }
    }
}

impl Error for AgbError {}

pub type AgbResult<T> = Result<T, AgbError>;

impl From<::std::io::Error> for AgbError {
    fn from(err: ::std::io::Error) -> AgbError {
        AgbError::Io(err)
    }
}

impl From<zip::result::ZipError> for AgbError {
    fn from(err: zip::result::ZipError) -> AgbError {
        AgbError::CartridgeLoad(err.to_string())
    }
}

pub mod prelude {
    pub use super::arm7tdmi;
    pub use super::cartridge::Cartridge;
    pub use super::gpu::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
    pub use super::keypad::Keys;
    pub use super::{AgbError, AgbResult, GameBoyAdvance};
    pub use agbemu_utils::{read_bin_file, write_bin_file};
}
