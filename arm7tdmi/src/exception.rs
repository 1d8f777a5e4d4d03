use super::cpu::Arm7tdmiCore;
use super::memory::MemoryInterface;
use super::{CpuMode, CpuState};

/// A CPU exception; the discriminant is the entry in the exception vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum Exception {
    Reset = 0x00,
    UndefinedInstruction = 0x04,
    SoftwareInterrupt = 0x08,
    PrefetchAbort = 0x0c,
    DataAbort = 0x10,
    Reserved = 0x14,
    Irq = 0x18,
    Fiq = 0x1c,
}

impl<I: MemoryInterface> Arm7tdmiCore<I> {
    /// Generic exception entry: bank switch with CPSR saved into the target
    /// mode's SPSR, IRQs masked, ARM state forced, link register loaded with
    /// `lr` (the caller computes the correct return address), and the PC
    /// placed on the vector.
    pub fn exception(&mut self, e: Exception, lr: u32) {
        use Exception::*;
        let (new_mode, fiq_disable) = match e {
            Reset => (CpuMode::Supervisor, true),
            UndefinedInstruction => (CpuMode::Undefined, false),
            SoftwareInterrupt => (CpuMode::Supervisor, false),
            PrefetchAbort => (CpuMode::Abort, false),
            DataAbort => (CpuMode::Abort, false),
            Reserved => panic!("cpu reserved exception"),
            Irq => (CpuMode::Irq, false),
            Fiq => (CpuMode::Fiq, true),
        };

        trace!("exception {:?} lr={:x} new_mode={:?}", e, lr, new_mode);

        let new_bank = new_mode.bank_index();
        self.banks.spsr_bank[new_bank] = self.cpsr;
        self.banks.gpr_banked_r14[new_bank] = lr;
        self.change_mode(self.cpsr.mode(), new_mode);
        // change_mode is a no-op for a same-bank entry; make sure the active
        // SPSR still picks up the saved CPSR in that case.
        self.spsr = self.banks.spsr_bank[new_bank];

        self.cpsr.set_state(CpuState::ARM);
        self.cpsr.set_irq_disabled(true);
        if fiq_disable {
            self.cpsr.set_fiq_disabled(true);
        }

        self.pc = e as u32;
    }

    /// Hardware interrupt entry; also wakes a halted core.
    #[inline]
    pub fn irq(&mut self) {
        if !self.cpsr.irq_disabled() {
            let lr = self.pc;
            self.exception(Exception::Irq, lr);
            self.halted = false;
        }
    }

    /// SWI entry; the return address is the instruction following the SWI.
    #[inline]
    pub fn software_interrupt(&mut self) {
        let lr = self.current_pc.wrapping_add(self.word_size() as u32);
        self.exception(Exception::SoftwareInterrupt, lr);
    }
}
