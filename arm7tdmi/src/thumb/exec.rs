use bit::BitIndex;

use super::super::alu::*;
use super::super::memory::MemoryInterface;
use super::super::{Arm7tdmiCore, REG_LR, REG_PC, REG_SP};
use super::consts::flags;
use super::{OpFormat3, OpFormat5, ThumbAluOps, ThumbDecodeHelper, ThumbFormat};

impl<I: MemoryInterface> Arm7tdmiCore<I> {
    /// Execute one Thumb instruction, returning the cycles consumed
    /// (always >= 1).
    pub fn exec_thumb(&mut self, insn: u16) -> usize {
        use ThumbFormat::*;
        match ThumbFormat::from(insn) {
            MoveShiftedReg => self.exec_thumb_move_shifted_reg(insn),
            AddSub => self.exec_thumb_add_sub(insn),
            DataProcessImm => self.exec_thumb_data_process_imm(insn),
            AluOps => self.exec_thumb_alu_ops(insn),
            HiRegOpOrBranchExchange => self.exec_thumb_hi_reg_op_or_bx(insn),
            LdrPc => self.exec_thumb_ldr_pc(insn),
            LdrStrRegOffset => self.exec_thumb_ldr_str_reg_offset(insn),
            LdrStrSHB => self.exec_thumb_ldr_str_shb(insn),
            LdrStrImmOffset => self.exec_thumb_ldr_str_imm_offset(insn),
            LdrStrHalfWord => self.exec_thumb_ldr_str_halfword(insn),
            LdrStrSp => self.exec_thumb_ldr_str_sp(insn),
            LoadAddress => self.exec_thumb_load_address(insn),
            AddSp => self.exec_thumb_add_sp(insn),
            PushPop => self.exec_thumb_push_pop(insn),
            LdmStm => self.exec_thumb_ldm_stm(insn),
            BranchConditional => self.exec_thumb_branch_with_cond(insn),
            Swi => self.exec_thumb_swi(insn),
            Branch => self.exec_thumb_branch(insn),
            BranchLongWithLink => self.exec_thumb_branch_long_with_link(insn),
            Undefined => self.thumb_undefined(insn),
        }
    }

    pub fn thumb_undefined(&mut self, insn: u16) -> usize {
        warn!(
            "undefined thumb instruction {:04x} at @{:08x}",
            insn, self.current_pc
        );
        1
    }

    /// Format 1: shift by 5-bit immediate
    fn exec_thumb_move_shifted_reg(&mut self, insn: u16) -> usize {
        let rd = (insn & 0b111) as usize;
        let rs = insn.rs();

        let mut carry = self.cpsr.C();
        let result = barrel_shift_op(
            insn.format1_op(),
            self.gpr[rs],
            insn.offset5(),
            &mut carry,
            true,
        );
        self.gpr[rd] = result;
        self.update_flags_nzcv(result, carry, self.cpsr.V());

        1
    }

    /// Format 2: ADD/SUB with a 3-bit register or immediate operand
    fn exec_thumb_add_sub(&mut self, insn: u16) -> usize {
        let rd = (insn & 0b111) as usize;
        let op1 = self.gpr[insn.rs()];
        let op2 = if insn.is_immediate_operand() {
            insn.rn() as u32
        } else {
            self.gpr[insn.rn()]
        };

        let mut carry = self.cpsr.C();
        let mut overflow = self.cpsr.V();
        let result = if insn.is_subtract() {
            alu_sub_flags(op1, op2, &mut carry, &mut overflow)
        } else {
            alu_add_flags(op1, op2, &mut carry, &mut overflow)
        };
        self.update_flags_nzcv(result, carry, overflow);
        self.gpr[rd] = result;

        1
    }

    /// Format 3: MOV/CMP/ADD/SUB with an 8-bit immediate
    fn exec_thumb_data_process_imm(&mut self, insn: u16) -> usize {
        use OpFormat3::*;
        let op = insn.format3_op();
        let rd = insn.bit_range(8..11) as usize;
        let op1 = self.gpr[rd];
        let op2 = (insn & 0xff) as u32;

        match op {
            MOV => {
                self.gpr[rd] = op2;
                self.update_flags_nz(op2);
            }
            CMP | SUB => {
                let mut carry = self.cpsr.C();
                let mut overflow = self.cpsr.V();
                let result = alu_sub_flags(op1, op2, &mut carry, &mut overflow);
                self.update_flags_nzcv(result, carry, overflow);
                if op == SUB {
                    self.gpr[rd] = result;
                }
            }
            ADD => {
                let mut carry = self.cpsr.C();
                let mut overflow = self.cpsr.V();
                let result = alu_add_flags(op1, op2, &mut carry, &mut overflow);
                self.update_flags_nzcv(result, carry, overflow);
                self.gpr[rd] = result;
            }
        }

        1
    }

    /// Format 4: the 16 register-to-register ALU operations
    fn exec_thumb_alu_ops(&mut self, insn: u16) -> usize {
        use ThumbAluOps::*;

        let rd = (insn & 0b111) as usize;
        let rs = insn.rs();
        let dst = self.gpr[rd];
        let src = self.gpr[rs];

        let mut carry = self.cpsr.C();
        let mut overflow = self.cpsr.V();
        let c_in = carry;

        let op = insn.format4_alu_op();
        let mut cycles = 1;

        macro_rules! shifter_op {
            ($bs_op:expr) => {{
                cycles = 2;
                let amount = src & 0xff;
                barrel_shift_op($bs_op, dst, amount, &mut carry, false)
            }};
        }

        let result = match op {
            AND | TST => dst & src,
            EOR => dst ^ src,
            LSL => shifter_op!(BarrelShiftOpCode::LSL),
            LSR => shifter_op!(BarrelShiftOpCode::LSR),
            ASR => shifter_op!(BarrelShiftOpCode::ASR),
            ROR => shifter_op!(BarrelShiftOpCode::ROR),
            ADC => alu_adc_flags(dst, src, c_in, &mut carry, &mut overflow),
            SBC => alu_sbc_flags(dst, src, c_in, &mut carry, &mut overflow),
            NEG => alu_sub_flags(0, src, &mut carry, &mut overflow),
            CMP => alu_sub_flags(dst, src, &mut carry, &mut overflow),
            CMN => alu_add_flags(dst, src, &mut carry, &mut overflow),
            ORR => dst | src,
            MUL => {
                cycles = 2;
                dst.wrapping_mul(src)
            }
            BIC => dst & !src,
            MVN => !src,
        };

        self.update_flags_nzcv(result, carry, overflow);
        if !op.is_setting_flags() {
            self.gpr[rd] = result;
        }

        cycles
    }

    /// Format 5: ADD/CMP/MOV/BX on high registers. ADD and MOV do not set
    /// flags here.
    fn exec_thumb_hi_reg_op_or_bx(&mut self, insn: u16) -> usize {
        let rd = (insn & 0b111) as usize;
        let dst_reg = if insn.flag(flags::FLAG_H1) { rd + 8 } else { rd };
        let src_reg = if insn.flag(flags::FLAG_H2) {
            insn.rs() + 8
        } else {
            insn.rs()
        };
        let op1 = self.reg_prefetch(dst_reg);
        let op2 = self.reg_prefetch(src_reg);

        match insn.format5_op() {
            OpFormat5::BX => self.branch_exchange(op2),
            OpFormat5::ADD => {
                self.set_reg(dst_reg, op1.wrapping_add(op2));
                if dst_reg == REG_PC {
                    3
                } else {
                    1
                }
            }
            OpFormat5::CMP => {
                let mut carry = self.cpsr.C();
                let mut overflow = self.cpsr.V();
                let result = alu_sub_flags(op1, op2, &mut carry, &mut overflow);
                self.update_flags_nzcv(result, carry, overflow);
                1
            }
            OpFormat5::MOV => {
                self.set_reg(dst_reg, op2);
                if dst_reg == REG_PC {
                    3
                } else {
                    1
                }
            }
        }
    }

    /// Format 6: PC-relative load, the literal pool access
    fn exec_thumb_ldr_pc(&mut self, insn: u16) -> usize {
        let rd = insn.bit_range(8..11) as usize;
        let addr = (self.prefetch_pc() & !3).wrapping_add(insn.word8());
        self.gpr[rd] = self.read_32(addr);
        3
    }

    fn do_exec_thumb_ldr_str(&mut self, insn: u16, addr: u32, is_byte: bool) -> usize {
        let rd = (insn & 0b111) as usize;
        if insn.is_load() {
            self.gpr[rd] = if is_byte {
                self.read_8(addr) as u32
            } else {
                self.ldr_word(addr)
            };
            3
        } else {
            let value = self.gpr[rd];
            if is_byte {
                self.write_8(addr, value as u8);
            } else {
                self.write_32(addr & !3, value);
            }
            2
        }
    }

    /// Format 7: load/store with register offset
    fn exec_thumb_ldr_str_reg_offset(&mut self, insn: u16) -> usize {
        let addr = self.gpr[insn.rb()].wrapping_add(self.gpr[insn.ro()]);
        self.do_exec_thumb_ldr_str(insn, addr, insn.flag(flags::FLAG_BYTE))
    }

    /// Format 8: load/store sign-extended byte/halfword
    fn exec_thumb_ldr_str_shb(&mut self, insn: u16) -> usize {
        let rd = (insn & 0b111) as usize;
        let addr = self.gpr[insn.rb()].wrapping_add(self.gpr[insn.ro()]);

        match (
            insn.flag(flags::FLAG_SIGN_EXTEND),
            insn.flag(flags::FLAG_HALFWORD),
        ) {
            (false, false) => {
                // strh
                self.write_16(addr & !1, self.gpr[rd] as u16);
                2
            }
            (false, true) => {
                // ldrh
                self.gpr[rd] = self.ldr_half(addr);
                3
            }
            (true, false) => {
                // ldsb
                self.gpr[rd] = self.read_8(addr) as i8 as i32 as u32;
                3
            }
            (true, true) => {
                // ldsh
                self.gpr[rd] = self.ldr_sign_half(addr);
                3
            }
        }
    }

    /// Format 9: load/store with 5-bit immediate offset
    fn exec_thumb_ldr_str_imm_offset(&mut self, insn: u16) -> usize {
        let rb = insn.rb();
        let is_byte = insn.bit(12);
        let offset = if is_byte {
            insn.offset5()
        } else {
            insn.offset5() << 2
        };
        let addr = self.gpr[rb].wrapping_add(offset);
        self.do_exec_thumb_ldr_str(insn, addr, is_byte)
    }

    /// Format 10: halfword load/store with immediate offset
    fn exec_thumb_ldr_str_halfword(&mut self, insn: u16) -> usize {
        let rd = (insn & 0b111) as usize;
        let addr = self.gpr[insn.rb()].wrapping_add(insn.offset5() << 1);
        if insn.is_load() {
            self.gpr[rd] = self.ldr_half(addr);
            3
        } else {
            self.write_16(addr & !1, self.gpr[rd] as u16);
            2
        }
    }

    /// Format 11: SP-relative load/store
    fn exec_thumb_ldr_str_sp(&mut self, insn: u16) -> usize {
        let addr = self.gpr[REG_SP].wrapping_add(insn.word8());
        let rd = insn.bit_range(8..11) as usize;
        if insn.is_load() {
            self.gpr[rd] = self.ldr_word(addr);
            3
        } else {
            self.write_32(addr & !3, self.gpr[rd]);
            2
        }
    }

    /// Format 12: ADD Rd, PC/SP, #imm
    fn exec_thumb_load_address(&mut self, insn: u16) -> usize {
        let rd = insn.bit_range(8..11) as usize;
        self.gpr[rd] = if insn.flag(flags::FLAG_SP) {
            self.gpr[REG_SP].wrapping_add(insn.word8())
        } else {
            (self.prefetch_pc() & !3).wrapping_add(insn.word8())
        };
        1
    }

    /// Format 13: adjust SP by a 7-bit signed immediate
    fn exec_thumb_add_sp(&mut self, insn: u16) -> usize {
        self.gpr[REG_SP] = (self.gpr[REG_SP] as i32).wrapping_add(insn.sword7()) as u32;
        1
    }

    /// Format 14: PUSH/POP. PUSH lays the registers out ascending below the
    /// old SP, LR on top; POP reads them back ascending, PC last. A popped
    /// PC takes its bit 0 as the Thumb flag, like BX.
    fn exec_thumb_push_pop(&mut self, insn: u16) -> usize {
        let is_pop = insn.is_load();
        let pc_lr_flag = insn.flag(flags::FLAG_R);
        let rlist = insn.register_list();
        let count = rlist.count_ones() + pc_lr_flag as u32;

        if is_pop {
            let mut addr = self.gpr[REG_SP];
            for r in 0..8 {
                if rlist.bit(r) {
                    self.gpr[r] = self.read_32(addr & !3);
                    addr = addr.wrapping_add(4);
                }
            }
            let mut cycles = 3;
            if pc_lr_flag {
                let pc = self.read_32(addr & !3);
                addr = addr.wrapping_add(4);
                self.branch_exchange(pc);
                cycles = 5;
            }
            self.gpr[REG_SP] = addr;
            cycles
        } else {
            let base = self.gpr[REG_SP].wrapping_sub(4 * count);
            self.gpr[REG_SP] = base;
            let mut addr = base;
            for r in 0..8 {
                if rlist.bit(r) {
                    self.write_32(addr & !3, self.gpr[r]);
                    addr = addr.wrapping_add(4);
                }
            }
            if pc_lr_flag {
                self.write_32(addr & !3, self.gpr[REG_LR]);
            }
            2
        }
    }

    /// Format 15: STMIA/LDMIA with base writeback
    fn exec_thumb_ldm_stm(&mut self, insn: u16) -> usize {
        let base_reg = insn.bit_range(8..11) as usize;
        let is_load = insn.is_load();

        let align_preserve = self.gpr[base_reg] & 3;
        let old_base = self.gpr[base_reg] & !3;
        let mut addr = old_base;
        let rlist = insn.register_list();

        if rlist != 0 {
            if is_load {
                for r in 0..8 {
                    if rlist.bit(r) {
                        let val = self.read_32(addr);
                        addr = addr.wrapping_add(4);
                        self.gpr[r] = val;
                    }
                }
                // base writeback is suppressed when the base was loaded
                if !rlist.bit(base_reg) {
                    self.gpr[base_reg] = addr + align_preserve;
                }
                3
            } else {
                let mut first = true;
                for r in 0..8 {
                    if rlist.bit(r) {
                        let val = if r != base_reg {
                            self.gpr[r]
                        } else if first {
                            old_base
                        } else {
                            old_base.wrapping_add(rlist.count_ones() * 4)
                        };
                        first = false;
                        self.write_32(addr, val);
                        addr = addr.wrapping_add(4);
                    }
                }
                self.gpr[base_reg] = addr + align_preserve;
                2
            }
        } else {
            // Empty register list transfers r15 and advances the base by 0x40
            let cycles = if is_load {
                let val = self.read_32(addr);
                self.pc = val & !1;
                5
            } else {
                self.write_32(addr, self.prefetch_pc().wrapping_add(2));
                2
            };
            self.gpr[base_reg] = addr.wrapping_add(0x40) + align_preserve;
            cycles
        }
    }

    /// Format 16: conditional branch
    fn exec_thumb_branch_with_cond(&mut self, insn: u16) -> usize {
        if !self.check_cond(insn.cond()) {
            1
        } else {
            let offset = insn.bcond_offset();
            self.pc = (self.prefetch_pc() as i32).wrapping_add(offset) as u32 & !1;
            3
        }
    }

    /// Format 17: SWI
    fn exec_thumb_swi(&mut self, _insn: u16) -> usize {
        self.software_interrupt();
        3
    }

    /// Format 18: unconditional branch
    fn exec_thumb_branch(&mut self, insn: u16) -> usize {
        let offset = (insn.offset11() << 21) >> 20;
        self.pc = (self.prefetch_pc() as i32).wrapping_add(offset) as u32 & !1;
        3
    }

    /// Format 19: the two-halfword long branch with link
    fn exec_thumb_branch_long_with_link(&mut self, insn: u16) -> usize {
        let mut off = insn.offset11();
        if insn.flag(flags::FLAG_LOW_OFFSET) {
            // second half: jump and leave the return address (with the thumb
            // bit) in lr
            off <<= 1;
            let next_pc = self.current_pc.wrapping_add(2) | 1;
            let target = ((self.gpr[REG_LR] & !1) as i32).wrapping_add(off) as u32;
            self.gpr[REG_LR] = next_pc;
            self.pc = target & !1;
            3
        } else {
            // first half: stage the upper part of the target in lr
            off = (off << 21) >> 9;
            self.gpr[REG_LR] = (self.prefetch_pc() as i32).wrapping_add(off) as u32;
            1
        }
    }
}

#[cfg(test)]
/// All instruction constants were generated using an ARM assembler.
mod tests {
    use super::*;
    use crate::{CpuMode, CpuState, SimpleMemory};
    use agbemu_utils::Shared;

    fn make_core() -> Arm7tdmiCore<SimpleMemory> {
        let bus = Shared::new(SimpleMemory::new(0x4000));
        let mut core = Arm7tdmiCore::new(bus);
        core.reset();
        core.cpsr.set_state(CpuState::THUMB);
        core.pc = 0x100;
        core
    }

    fn step_one(core: &mut Arm7tdmiCore<SimpleMemory>, insn: u16) -> usize {
        let pc = core.pc;
        core.bus.write_16(pc, insn);
        core.step()
    }

    #[test]
    fn mov_low_reg() {
        // movs r0, #0x27
        let mut core = make_core();
        let cycles = step_one(&mut core, 0x2027);
        assert_eq!(core.gpr[0], 0x27);
        assert!(!core.cpsr.Z());
        assert_eq!(cycles, 1);
    }

    #[test]
    fn lsl_immediate_sets_carry() {
        // lsls r1, r0, #1
        let mut core = make_core();
        core.gpr[0] = 0x8000_0001;
        step_one(&mut core, 0x0041);
        assert_eq!(core.gpr[1], 2);
        assert!(core.cpsr.C());
        assert!(!core.cpsr.N());
    }

    #[test]
    fn add_sub_format2() {
        // adds r0, r1, r2
        let mut core = make_core();
        core.gpr[1] = 3;
        core.gpr[2] = 4;
        step_one(&mut core, 0x1888);
        assert_eq!(core.gpr[0], 7);
        assert!(!core.cpsr.Z());

        // subs r0, r1, #1
        let mut core = make_core();
        core.gpr[1] = 1;
        step_one(&mut core, 0x1e48);
        assert_eq!(core.gpr[0], 0);
        assert!(core.cpsr.Z());
        assert!(core.cpsr.C());
    }

    #[test]
    fn alu_ops_format4() {
        // muls r0, r1
        let mut core = make_core();
        core.gpr[0] = 6;
        core.gpr[1] = 7;
        let cycles = step_one(&mut core, 0x4348);
        assert_eq!(core.gpr[0], 42);
        assert_eq!(cycles, 2);

        // negs r0, r1
        let mut core = make_core();
        core.gpr[1] = 1;
        step_one(&mut core, 0x4248);
        assert_eq!(core.gpr[0], 0xffff_ffff);
        assert!(core.cpsr.N());

        // register shift by zero leaves the value and carry alone
        let mut core = make_core();
        core.gpr[0] = 0x8000_0001;
        core.gpr[1] = 0;
        core.cpsr.set_C(true);
        let cycles = step_one(&mut core, 0x4088); // lsls r0, r1
        assert_eq!(core.gpr[0], 0x8000_0001);
        assert!(core.cpsr.C());
        assert_eq!(cycles, 2);
    }

    #[test]
    fn hi_reg_add_no_flags() {
        // add r1, r8
        let mut core = make_core();
        core.gpr[1] = 1;
        core.gpr[8] = 0x7fff_ffff;
        step_one(&mut core, 0x4441);
        assert_eq!(core.gpr[1], 0x8000_0000);
        assert!(!core.cpsr.N()); // flags untouched
        assert!(!core.cpsr.V());
    }

    #[test]
    fn bx_back_to_arm() {
        // bx lr
        let mut core = make_core();
        core.gpr[REG_LR] = 0x200;
        let cycles = step_one(&mut core, 0x4770);
        assert_eq!(core.pc, 0x200);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn ldr_pc_relative() {
        // ldr r0, [pc, #4]
        let mut core = make_core();
        core.pc = 0x106;
        core.bus.write_32(0x10c, 0x1234_5678);
        let cycles = step_one(&mut core, 0x4801);
        assert_eq!(core.gpr[0], 0x1234_5678);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn ldr_str_reg_offset() {
        let mut core = make_core();
        core.gpr[0] = 0x1234_5678;
        core.gpr[1] = 0x4;
        core.gpr[4] = 0x1000;
        // str r0, [r4, r1]
        let cycles = step_one(&mut core, 0x5060);
        assert_eq!(core.bus.read_32(0x1004), 0x1234_5678);
        assert_eq!(cycles, 2);

        // ldrb r2, [r4, r1]
        let cycles = step_one(&mut core, 0x5c62);
        assert_eq!(core.gpr[2], 0x78);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn sign_extended_loads() {
        let mut core = make_core();
        core.bus.write_16(0x1000, 0xff80);
        core.gpr[3] = 0x1000;
        core.gpr[0] = 0;
        // ldsh r2, [r3, r0]
        step_one(&mut core, 0x5e1a);
        assert_eq!(core.gpr[2], 0xffff_ff80);

        // ldsb r2, [r3, r0]
        let mut core = make_core();
        core.bus.write_8(0x1000, 0x80);
        core.gpr[3] = 0x1000;
        core.gpr[0] = 0;
        step_one(&mut core, 0x561a);
        assert_eq!(core.gpr[2], 0xffff_ff80);
    }

    #[test]
    fn thumb_word_load_rotates_misaligned() {
        let mut core = make_core();
        core.bus.write_32(0x1000, 0xdead_beef);
        core.gpr[1] = 0x1002;
        core.gpr[2] = 0;
        // ldr r0, [r1, r2]
        step_one(&mut core, 0x5888);
        assert_eq!(core.gpr[0], 0xbeef_dead);
    }

    #[test]
    fn push_pop_roundtrip() {
        let mut core = make_core();
        core.gpr[REG_SP] = 0x3f00;
        let sp = core.gpr[REG_SP];
        core.gpr[0] = 0x11;
        core.gpr[1] = 0x22;
        core.gpr[REG_LR] = 0xaaaa;

        // push {r0, r1, lr}
        let cycles = step_one(&mut core, 0xb503);
        assert_eq!(core.gpr[REG_SP], sp - 12);
        assert_eq!(core.bus.read_32(sp - 12), 0x11);
        assert_eq!(core.bus.read_32(sp - 8), 0x22);
        assert_eq!(core.bus.read_32(sp - 4), 0xaaaa);
        assert_eq!(cycles, 2);

        core.gpr[0] = 0;
        core.gpr[1] = 0;

        // pop {r0, r1, pc}
        let cycles = step_one(&mut core, 0xbd03);
        assert_eq!(core.gpr[0], 0x11);
        assert_eq!(core.gpr[1], 0x22);
        assert_eq!(core.gpr[REG_SP], sp);
        // bit 0 of the popped value was clear, so we land in ARM state
        assert_eq!(core.pc, 0xaaaa & !3);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert_eq!(cycles, 5);
    }

    #[test]
    fn pop_pc_with_thumb_bit() {
        let mut core = make_core();
        core.gpr[REG_SP] = 0x2000;
        core.bus.write_32(0x2000, 0xaaab);
        // pop {pc}
        step_one(&mut core, 0xbd00);
        assert_eq!(core.pc, 0xaaaa);
        assert_eq!(core.cpsr.state(), CpuState::THUMB);
    }

    #[test]
    fn sp_relative_load_store() {
        let mut core = make_core();
        core.gpr[REG_SP] = 0x2000;
        core.gpr[0] = 0xcafe_babe;
        // str r0, [sp, #4]
        step_one(&mut core, 0x9001);
        assert_eq!(core.bus.read_32(0x2004), 0xcafe_babe);

        // ldr r1, [sp, #4]
        step_one(&mut core, 0x9901);
        assert_eq!(core.gpr[1], 0xcafe_babe);
    }

    #[test]
    fn add_sp_and_load_address() {
        // sub sp, #8
        let mut core = make_core();
        core.gpr[REG_SP] = 0x2000;
        step_one(&mut core, 0xb082);
        assert_eq!(core.gpr[REG_SP], 0x1ff8);

        // add r0, pc, #4 : pc is prefetch & !3
        let mut core = make_core();
        core.pc = 0x102;
        step_one(&mut core, 0xa001);
        assert_eq!(core.gpr[0], 0x104 + 4);
    }

    #[test]
    fn stmia_ldmia_with_writeback() {
        let mut core = make_core();
        core.gpr[1] = 0x1800;
        core.gpr[0] = 0xaa;
        core.gpr[2] = 0xbb;
        // stmia r1!, {r0, r2}
        step_one(&mut core, 0xc105);
        assert_eq!(core.gpr[1], 0x1808);
        assert_eq!(core.bus.read_32(0x1800), 0xaa);
        assert_eq!(core.bus.read_32(0x1804), 0xbb);

        core.gpr[0] = 0;
        core.gpr[2] = 0;
        core.gpr[1] = 0x1800;
        // ldmia r1!, {r0, r2}
        step_one(&mut core, 0xc905);
        assert_eq!((core.gpr[0], core.gpr[2]), (0xaa, 0xbb));
        assert_eq!(core.gpr[1], 0x1808);
    }

    #[test]
    fn ldmia_base_in_list_suppresses_writeback() {
        let mut core = make_core();
        core.gpr[1] = 0x1800;
        core.bus.write_32(0x1800, 0x55);
        core.bus.write_32(0x1804, 0x66);
        // ldmia r1!, {r0, r1}
        step_one(&mut core, 0xc903);
        assert_eq!(core.gpr[0], 0x55);
        assert_eq!(core.gpr[1], 0x66);
    }

    #[test]
    fn conditional_branch_taken_and_not() {
        // beq -4
        let mut core = make_core();
        core.cpsr.set_Z(true);
        let cycles = step_one(&mut core, 0xd0fe);
        assert_eq!(core.pc, 0x100);
        assert_eq!(cycles, 3);

        let mut core = make_core();
        core.cpsr.set_Z(false);
        let cycles = step_one(&mut core, 0xd0fe);
        assert_eq!(core.pc, 0x102);
        assert_eq!(cycles, 1);
    }

    #[test]
    fn unconditional_branch() {
        // b -4 (idle loop)
        let mut core = make_core();
        let cycles = step_one(&mut core, 0xe7fe);
        assert_eq!(core.pc, 0x100);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn long_branch_with_link() {
        let mut core = make_core();
        // bl +0x10 : f000 f808
        let c1 = step_one(&mut core, 0xf000);
        assert_eq!(c1, 1);
        assert_eq!(core.gpr[REG_LR], 0x104);

        let c2 = step_one(&mut core, 0xf808);
        assert_eq!(c2, 3);
        assert_eq!(core.pc, 0x114);
        assert_eq!(core.gpr[REG_LR], 0x105); // return address with thumb bit
    }

    #[test]
    fn thumb_swi() {
        let mut core = make_core();
        core.pc = 0x200;
        let cpsr_before = core.cpsr;
        // swi #1
        let cycles = step_one(&mut core, 0xdf01);
        assert_eq!(cycles, 3);
        assert_eq!(core.cpsr.mode(), CpuMode::Supervisor);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert_eq!(core.gpr[REG_LR], 0x202);
        assert_eq!(core.pc, 0x08);
        assert_eq!(core.spsr.get(), cpsr_before.get());
    }
}
