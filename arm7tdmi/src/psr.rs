//! The program status register
use std::fmt;

use serde::{Deserialize, Serialize};

use num::FromPrimitive;

use super::{CpuMode, CpuState};

const SIGN_BIT: u32 = 31;
const ZERO_BIT: u32 = 30;
const CARRY_BIT: u32 = 29;
const OVERFLOW_BIT: u32 = 28;
const IRQ_DISABLE_BIT: u32 = 7;
const FIQ_DISABLE_BIT: u32 = 6;
const THUMB_BIT: u32 = 5;
const MODE_MASK: u32 = 0b1_1111;

/// Packed CPSR/SPSR word. All 32 bits are kept verbatim so that
/// `RegPsr::new(x).get() == x` holds for every x.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct RegPsr {
    raw: u32,
}

/// Generates the get/set pair for a single-bit field.
macro_rules! psr_bit {
    ($($(#[$attr:meta])* $get:ident, $set:ident => $bit:expr;)*) => {
        $(
            $(#[$attr])*
            #[allow(non_snake_case)]
            #[inline]
            pub fn $get(&self) -> bool {
                self.raw & (1 << $bit) != 0
            }

            $(#[$attr])*
            #[allow(non_snake_case)]
            #[inline]
            pub fn $set(&mut self, on: bool) {
                self.raw = (self.raw & !(1 << $bit)) | ((on as u32) << $bit);
            }
        )*
    };
}

impl RegPsr {
    pub const FLAG_BITMASK: u32 = 0xf000_0000;

    pub fn new(u: u32) -> RegPsr {
        RegPsr { raw: u }
    }

    pub fn get(&self) -> u32 {
        self.raw
    }

    pub fn set(&mut self, psr: u32) {
        self.raw = psr;
    }

    psr_bit! {
        N, set_N => SIGN_BIT;
        Z, set_Z => ZERO_BIT;
        C, set_C => CARRY_BIT;
        V, set_V => OVERFLOW_BIT;
        irq_disabled, set_irq_disabled => IRQ_DISABLE_BIT;
        fiq_disabled, set_fiq_disabled => FIQ_DISABLE_BIT;
        thumb_bit, set_thumb_bit => THUMB_BIT;
    }

    pub fn state(&self) -> CpuState {
        if self.thumb_bit() {
            CpuState::THUMB
        } else {
            CpuState::ARM
        }
    }

    pub fn set_state(&mut self, state: CpuState) {
        self.set_thumb_bit(matches!(state, CpuState::THUMB));
    }

    /// The mode field is expected to always hold a valid encoding; writers go
    /// through `CpuMode` so this cannot observe an invalid value.
    pub fn mode(&self) -> CpuMode {
        self.try_mode().expect("invalid mode bits in psr")
    }

    pub fn try_mode(&self) -> Option<CpuMode> {
        CpuMode::from_u32(self.raw & MODE_MASK)
    }

    pub fn set_mode(&mut self, mode: CpuMode) {
        self.raw = (self.raw & !MODE_MASK) | (mode as u32);
    }
}

impl fmt::Display for RegPsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use colored::*;

        let cond = |on: bool, c: char| if on { c } else { '-' };
        let line = |name: &'static str, masked: bool| -> ColoredString {
            if masked {
                name.bright_red()
            } else {
                name.bright_green()
            }
        };

        write!(
            f,
            "{raw:#010x} {mode}/{state} [{n}{z}{c}{v}] {irq} {fiq}",
            raw = self.raw,
            mode = self.mode(),
            state = self.state(),
            n = cond(self.N(), 'N'),
            z = cond(self.Z(), 'Z'),
            c = cond(self.C(), 'C'),
            v = cond(self.V(), 'V'),
            irq = line("irq", self.irq_disabled()),
            fiq = line("fiq", self.fiq_disabled()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        for &raw in &[
            0x0000_00d3u32,
            0x8000_001f,
            0x6000_0092,
            0xf000_0030,
            0xdead_beef,
            0xffff_ffff,
            0,
        ] {
            let psr = RegPsr::new(raw);
            assert_eq!(psr.get(), raw);
        }
    }

    #[test]
    fn field_accessors() {
        let mut psr = RegPsr::new(0x0000_00d3);
        assert_eq!(psr.mode(), CpuMode::Supervisor);
        assert_eq!(psr.state(), CpuState::ARM);
        assert!(psr.irq_disabled());
        assert!(psr.fiq_disabled());
        assert!(!psr.N());

        psr.set_N(true);
        psr.set_state(CpuState::THUMB);
        psr.set_mode(CpuMode::System);
        assert_eq!(psr.get(), 0x8000_00ff);
        assert_eq!(psr.mode(), CpuMode::System);
        assert_eq!(psr.state(), CpuState::THUMB);
    }

    #[test]
    fn clearing_a_flag_leaves_the_rest() {
        let mut psr = RegPsr::new(0xf000_00df);
        psr.set_C(false);
        assert_eq!(psr.get(), 0xd000_00df);
        psr.set_irq_disabled(false);
        assert_eq!(psr.get(), 0xd000_005f);
    }
}
