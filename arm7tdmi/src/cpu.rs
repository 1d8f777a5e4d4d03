use std::fmt;

use serde::{Deserialize, Serialize};

use ansi_term::Style;
use bit::BitIndex;

use agbemu_utils::{Shared, WeakPointer};

pub use super::exception::Exception;
use super::memory::MemoryInterface;
use super::psr::RegPsr;
use super::{reg_string, CpuMode, CpuState, REG_PC};

/// Stack pointers installed by the BIOS boot code.
pub const SP_USR_SYS: u32 = 0x0300_7f00;
pub const SP_IRQ: u32 = 0x0300_7fa0;
pub const SP_SVC: u32 = 0x0300_7fe0;

/// Start of the game pak ROM region, where execution begins after reset.
pub const PC_BOOT: u32 = 0x0800_0000;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub(crate) struct BankedRegisters {
    // r13 and r14 are banked for all modes. System&User mode share them
    pub(crate) gpr_banked_r13: [u32; 6],
    pub(crate) gpr_banked_r14: [u32; 6],
    // r8-r12 are banked for fiq mode
    pub(crate) gpr_banked_old_r8_12: [u32; 5],
    pub(crate) gpr_banked_fiq_r8_12: [u32; 5],
    pub(crate) spsr_bank: [RegPsr; 6],
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SavedCpuState {
    pub pc: u32,
    pub gpr: [u32; 15],
    pub cpsr: RegPsr,
    pub(crate) spsr: RegPsr,
    pub(crate) banks: BankedRegisters,
    pub halted: bool,
    pub stopped: bool,
    pub cycles: usize,
}

pub struct Arm7tdmiCore<I: MemoryInterface> {
    pub bus: Shared<I>,

    pub pc: u32,
    pub gpr: [u32; 15],

    pub cpsr: RegPsr,
    pub(crate) spsr: RegPsr,
    pub(crate) banks: BankedRegisters,

    /// HALTCNT low-power state; a halted core burns one cycle per step until
    /// an IRQ is delivered.
    pub halted: bool,
    /// STOP is latched only, there is no exit path on this hardware revision.
    pub stopped: bool,

    /// Total cycles consumed since reset
    pub cycles: usize,

    /// Address of the instruction currently being executed. `pc` is advanced
    /// past the fetched instruction before execution, which is what makes an
    /// in-instruction read of r15 observe the prefetched address.
    pub(crate) current_pc: u32,
}

impl<I: MemoryInterface> Arm7tdmiCore<I> {
    pub fn new(bus: Shared<I>) -> Arm7tdmiCore<I> {
        Arm7tdmiCore {
            bus,
            pc: 0,
            gpr: [0; 15],
            cpsr: RegPsr::new(0x0000_00d3),
            spsr: Default::default(),
            banks: BankedRegisters::default(),
            halted: false,
            stopped: false,
            cycles: 0,
            current_pc: 0,
        }
    }

    pub fn weak_ptr(&mut self) -> WeakPointer<Arm7tdmiCore<I>> {
        WeakPointer::new(self as *mut Arm7tdmiCore<I>)
    }

    pub fn from_saved_state(bus: Shared<I>, state: SavedCpuState) -> Arm7tdmiCore<I> {
        Arm7tdmiCore {
            bus,
            pc: state.pc,
            gpr: state.gpr,
            cpsr: state.cpsr,
            spsr: state.spsr,
            banks: state.banks,
            halted: state.halted,
            stopped: state.stopped,
            cycles: state.cycles,
            current_pc: state.pc,
        }
    }

    pub fn save_state(&self) -> SavedCpuState {
        SavedCpuState {
            pc: self.pc,
            gpr: self.gpr,
            cpsr: self.cpsr,
            spsr: self.spsr,
            banks: self.banks.clone(),
            halted: self.halted,
            stopped: self.stopped,
            cycles: self.cycles,
        }
    }

    pub fn restore_state(&mut self, state: SavedCpuState) {
        self.pc = state.pc;
        self.gpr = state.gpr;
        self.cpsr = state.cpsr;
        self.spsr = state.spsr;
        self.banks = state.banks;
        self.halted = state.halted;
        self.stopped = state.stopped;
        self.cycles = state.cycles;
        self.current_pc = state.pc;
    }

    pub fn set_memory_interface(&mut self, i: Shared<I>) {
        self.bus = i;
    }

    /// Put the core into the post-BIOS boot state: zeroed registers, the
    /// BIOS-installed stack pointers, System mode with IRQ/FIQ masked, ARM
    /// state, execution starting at the game pak.
    pub fn reset(&mut self) {
        self.gpr = [0; 15];
        self.banks = BankedRegisters::default();
        self.spsr = RegPsr::default();

        self.banks.gpr_banked_r13[CpuMode::User.bank_index()] = SP_USR_SYS;
        self.banks.gpr_banked_r13[CpuMode::Irq.bank_index()] = SP_IRQ;
        self.banks.gpr_banked_r13[CpuMode::Supervisor.bank_index()] = SP_SVC;
        self.gpr[13] = SP_USR_SYS;

        self.cpsr = RegPsr::new(0x0000_00df); // System, IRQ+FIQ masked, ARM state
        self.pc = PC_BOOT;
        self.current_pc = PC_BOOT;

        self.halted = false;
        self.stopped = false;
        self.cycles = 0;
    }

    pub fn word_size(&self) -> usize {
        match self.cpsr.state() {
            CpuState::ARM => 4,
            CpuState::THUMB => 2,
        }
    }

    pub fn get_reg(&self, r: usize) -> u32 {
        match r {
            0..=14 => self.gpr[r],
            15 => self.pc,
            _ => panic!("invalid register {}", r),
        }
    }

    pub fn set_reg(&mut self, r: usize, val: u32) {
        match r {
            0..=14 => self.gpr[r] = val,
            15 => {
                self.pc = match self.cpsr.state() {
                    CpuState::THUMB => val & !1,
                    CpuState::ARM => val & !3,
                }
            }
            _ => panic!("invalid register {}", r),
        }
    }

    /// User-bank view of the register file, used by LDM/STM with the S bit.
    pub fn get_reg_user(&self, r: usize) -> u32 {
        match r {
            0..=7 => self.gpr[r],
            8..=12 => {
                if self.cpsr.mode() == CpuMode::Fiq {
                    self.banks.gpr_banked_old_r8_12[r - 8]
                } else {
                    self.gpr[r]
                }
            }
            13 => self.banks.gpr_banked_r13[0],
            14 => self.banks.gpr_banked_r14[0],
            _ => panic!("invalid register {}", r),
        }
    }

    pub fn set_reg_user(&mut self, r: usize, val: u32) {
        match r {
            0..=7 => self.gpr[r] = val,
            8..=12 => {
                if self.cpsr.mode() == CpuMode::Fiq {
                    self.banks.gpr_banked_old_r8_12[r - 8] = val;
                } else {
                    self.gpr[r] = val;
                }
            }
            13 => self.banks.gpr_banked_r13[0] = val,
            14 => self.banks.gpr_banked_r14[0] = val,
            _ => panic!("invalid register {}", r),
        }
    }

    pub fn get_registers(&self) -> [u32; 15] {
        self.gpr
    }

    /// Value of r15 as observed by the instruction currently executing:
    /// two fetches ahead of the instruction's own address.
    #[inline]
    pub(crate) fn prefetch_pc(&self) -> u32 {
        match self.cpsr.state() {
            CpuState::ARM => self.current_pc.wrapping_add(8),
            CpuState::THUMB => self.current_pc.wrapping_add(4),
        }
    }

    /// Register read as seen from inside an instruction (r15 reads the
    /// prefetched address).
    #[inline]
    pub(crate) fn reg_prefetch(&self, r: usize) -> u32 {
        if r == REG_PC {
            self.prefetch_pc()
        } else {
            self.gpr[r]
        }
    }

    /// Reading the SPSR in a mode that has none yields the live CPSR.
    pub fn get_spsr(&self) -> RegPsr {
        if self.cpsr.mode().has_spsr() {
            self.spsr
        } else {
            self.cpsr
        }
    }

    /// Swap the banked registers when the mode field changes. Does not touch
    /// I/F/T; exception entry adjusts those itself.
    pub(crate) fn change_mode(&mut self, old_mode: CpuMode, new_mode: CpuMode) {
        let new_index = new_mode.bank_index();
        let old_index = old_mode.bank_index();

        self.cpsr.set_mode(new_mode);

        if new_index == old_index {
            return;
        }

        let banks = &mut self.banks;

        banks.spsr_bank[old_index] = self.spsr;
        banks.gpr_banked_r13[old_index] = self.gpr[13];
        banks.gpr_banked_r14[old_index] = self.gpr[14];

        self.spsr = banks.spsr_bank[new_index];
        self.gpr[13] = banks.gpr_banked_r13[new_index];
        self.gpr[14] = banks.gpr_banked_r14[new_index];

        if new_mode == CpuMode::Fiq {
            for r in 0..5 {
                banks.gpr_banked_old_r8_12[r] = self.gpr[r + 8];
                self.gpr[r + 8] = banks.gpr_banked_fiq_r8_12[r];
            }
        } else if old_mode == CpuMode::Fiq {
            for r in 0..5 {
                banks.gpr_banked_fiq_r8_12[r] = self.gpr[r + 8];
                self.gpr[r + 8] = banks.gpr_banked_old_r8_12[r];
            }
        }
    }

    /// The exception-return idiom: data processing or LDM writing r15 with
    /// the S bit copies SPSR back into CPSR, restoring the interrupted mode
    /// and Thumb state. No-op in modes without an SPSR.
    pub(crate) fn transfer_spsr_mode(&mut self) {
        if !self.cpsr.mode().has_spsr() {
            return;
        }
        let spsr = self.spsr;
        if self.cpsr.mode() != spsr.mode() {
            self.change_mode(self.cpsr.mode(), spsr.mode());
        }
        self.cpsr = spsr;
    }

    /// Standard ARM condition table. AL and the reserved NV encoding both
    /// pass; NV is never emitted by a correct program.
    #[inline(always)]
    pub(crate) fn check_cond(&self, cond: u32) -> bool {
        match cond {
            0x0 => self.cpsr.Z(),                                   // EQ
            0x1 => !self.cpsr.Z(),                                  // NE
            0x2 => self.cpsr.C(),                                   // HS
            0x3 => !self.cpsr.C(),                                  // LO
            0x4 => self.cpsr.N(),                                   // MI
            0x5 => !self.cpsr.N(),                                  // PL
            0x6 => self.cpsr.V(),                                   // VS
            0x7 => !self.cpsr.V(),                                  // VC
            0x8 => self.cpsr.C() && !self.cpsr.Z(),                 // HI
            0x9 => !self.cpsr.C() || self.cpsr.Z(),                 // LS
            0xa => self.cpsr.N() == self.cpsr.V(),                  // GE
            0xb => self.cpsr.N() != self.cpsr.V(),                  // LT
            0xc => !self.cpsr.Z() && (self.cpsr.N() == self.cpsr.V()), // GT
            0xd => self.cpsr.Z() || (self.cpsr.N() != self.cpsr.V()), // LE
            _ => true,                                              // AL, NV
        }
    }

    #[inline]
    pub(crate) fn update_flags_nz(&mut self, result: u32) {
        self.cpsr.set_N((result as i32) < 0);
        self.cpsr.set_Z(result == 0);
    }

    #[inline]
    pub(crate) fn update_flags_nzcv(&mut self, result: u32, c: bool, v: bool) {
        self.update_flags_nz(result);
        self.cpsr.set_C(c);
        self.cpsr.set_V(v);
    }

    /// Execute a single instruction and return the cycles it consumed
    /// (always at least 1).
    pub fn step(&mut self) -> usize {
        if self.halted {
            self.cycles += 1;
            return 1;
        }

        self.current_pc = self.pc;

        let cycles = match self.cpsr.state() {
            CpuState::ARM => {
                let insn = self.read_32(self.pc & !3);
                self.pc = self.pc.wrapping_add(4);
                let cond = insn.bit_range(28..32);
                if self.check_cond(cond) {
                    self.exec_arm(insn)
                } else {
                    1
                }
            }
            CpuState::THUMB => {
                let insn = self.read_16(self.pc & !1);
                self.pc = self.pc.wrapping_add(2);
                self.exec_thumb(insn)
            }
        };

        self.cycles += cycles;
        cycles
    }

    pub fn get_cpu_state(&self) -> CpuState {
        self.cpsr.state()
    }
}

impl<I: MemoryInterface> fmt::Display for Arm7tdmiCore<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ARM7TDMI Core Status:")?;
        writeln!(f, "\tCycles: {}", self.cycles)?;
        writeln!(f, "\tCPSR: {}", self.cpsr)?;
        writeln!(f, "\tGeneral Purpose Registers:")?;
        let reg_style = Style::new().bold();
        let gpr = self.get_registers();
        for (i, val) in gpr.iter().enumerate() {
            let mut reg_name = reg_string(i).to_string();
            reg_name.make_ascii_uppercase();

            let entry = format!("\t{:-3} = 0x{:08x}", reg_name, val);
            write!(
                f,
                "{}{}",
                reg_style.paint(entry),
                if (i + 1) % 4 == 0 { "\n" } else { "" }
            )?;
        }
        let pc = format!("\tPC  = 0x{:08x}", self.pc);
        writeln!(f, "{}", reg_style.paint(pc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleMemory;

    fn make_core() -> Arm7tdmiCore<SimpleMemory> {
        let bus = Shared::new(SimpleMemory::new(0x4000));
        let mut core = Arm7tdmiCore::new(bus);
        core.reset();
        core
    }

    #[test]
    fn reset_state() {
        let core = make_core();
        assert_eq!(core.pc, PC_BOOT);
        assert_eq!(core.cpsr.mode(), CpuMode::System);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert!(core.cpsr.irq_disabled());
        assert!(core.cpsr.fiq_disabled());
        assert_eq!(core.gpr[13], SP_USR_SYS);
        assert_eq!(
            core.banks.gpr_banked_r13[CpuMode::Irq.bank_index()],
            SP_IRQ
        );
        assert_eq!(
            core.banks.gpr_banked_r13[CpuMode::Supervisor.bank_index()],
            SP_SVC
        );
    }

    #[test]
    fn pc_write_masks_alignment() {
        let mut core = make_core();
        core.set_reg(15, 0x0800_0003);
        assert_eq!(core.pc, 0x0800_0000);

        core.cpsr.set_state(CpuState::THUMB);
        core.set_reg(15, 0x0800_0003);
        assert_eq!(core.pc, 0x0800_0002);
    }

    #[test]
    fn banked_registers_are_disjoint() {
        let mut core = make_core();

        core.gpr[13] = 0x1111_1111;
        core.gpr[14] = 0x2222_2222;

        core.change_mode(CpuMode::System, CpuMode::Irq);
        assert_eq!(core.cpsr.mode(), CpuMode::Irq);
        assert_eq!(core.gpr[13], SP_IRQ);
        core.gpr[13] = 0x3333_3333;

        core.change_mode(CpuMode::Irq, CpuMode::Fiq);
        core.gpr[8] = 0xf1f1_f1f1;

        core.change_mode(CpuMode::Fiq, CpuMode::System);
        assert_eq!(core.gpr[13], 0x1111_1111);
        assert_eq!(core.gpr[14], 0x2222_2222);
        assert_eq!(core.gpr[8], 0);

        core.change_mode(CpuMode::System, CpuMode::Irq);
        assert_eq!(core.gpr[13], 0x3333_3333);

        core.change_mode(CpuMode::Irq, CpuMode::Fiq);
        assert_eq!(core.gpr[8], 0xf1f1_f1f1);
    }

    #[test]
    fn system_aliases_user_bank() {
        let mut core = make_core();
        core.gpr[13] = 0xaaaa_0000;
        core.change_mode(CpuMode::System, CpuMode::User);
        assert_eq!(core.gpr[13], 0xaaaa_0000);
    }

    #[test]
    fn spsr_read_in_system_yields_cpsr() {
        let core = make_core();
        assert_eq!(core.get_spsr().get(), core.cpsr.get());
    }

    #[test]
    fn condition_table() {
        let mut core = make_core();
        core.cpsr.set_Z(true);
        assert!(core.check_cond(0x0)); // EQ
        assert!(!core.check_cond(0x1)); // NE
        core.cpsr.set_Z(false);
        core.cpsr.set_N(true);
        core.cpsr.set_V(false);
        assert!(core.check_cond(0xb)); // LT
        assert!(!core.check_cond(0xa)); // GE
        assert!(core.check_cond(0xe)); // AL
        assert!(core.check_cond(0xf)); // NV behaves as always
    }

    #[test]
    fn halted_step_burns_one_cycle() {
        let mut core = make_core();
        core.halted = true;
        let pc = core.pc;
        assert_eq!(core.step(), 1);
        assert_eq!(core.pc, pc);
    }

    #[test]
    fn exception_entry_and_return() {
        let mut core = make_core();
        core.change_mode(CpuMode::System, CpuMode::User);
        core.cpsr.set_N(true);
        let cpsr_before = core.cpsr;

        core.exception(Exception::SoftwareInterrupt, 0x0800_0204);

        assert_eq!(core.cpsr.mode(), CpuMode::Supervisor);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert!(core.cpsr.irq_disabled());
        assert_eq!(core.pc, 0x08);
        assert_eq!(core.gpr[14], 0x0800_0204);
        assert_eq!(core.spsr.get(), cpsr_before.get());

        core.transfer_spsr_mode();
        assert_eq!(core.cpsr.get(), cpsr_before.get());
        assert_eq!(core.cpsr.mode(), CpuMode::User);
    }

    #[test]
    fn savestate_roundtrip() {
        let mut core = make_core();
        core.gpr[3] = 0x1234_5678;
        core.cycles = 42;
        let state = core.save_state();

        let mut other = make_core();
        other.restore_state(state);
        assert_eq!(other.gpr[3], 0x1234_5678);
        assert_eq!(other.cycles, 42);
        assert_eq!(other.pc, core.pc);
    }
}
