use bit::BitIndex;

use super::super::alu::*;
use super::super::memory::MemoryInterface;
use super::super::psr::RegPsr;
use super::super::{Addr, Arm7tdmiCore, CpuMode, CpuState, REG_LR, REG_PC};
use super::{ArmDecodeHelper, ArmFormat, ArmHalfwordTransferType};

impl<I: MemoryInterface> Arm7tdmiCore<I> {
    /// Execute one ARM instruction whose condition already passed.
    /// Returns the cycles consumed (always >= 1).
    pub fn exec_arm(&mut self, insn: u32) -> usize {
        use ArmFormat::*;
        match ArmFormat::from(insn) {
            BranchExchange => self.exec_arm_bx(insn),
            BranchLink => self.exec_arm_b_bl(insn),
            SoftwareInterrupt => self.exec_arm_swi(insn),
            Multiply => self.exec_arm_mul_mla(insn),
            MultiplyLong => self.exec_arm_mull_mlal(insn),
            SingleDataTransfer => self.exec_arm_ldr_str(insn),
            HalfwordDataTransferRegOffset => self.exec_arm_ldr_str_hs_reg(insn),
            HalfwordDataTransferImmediateOffset => self.exec_arm_ldr_str_hs_imm(insn),
            DataProcessing => self.exec_arm_data_processing(insn),
            BlockDataTransfer => self.exec_arm_ldm_stm(insn),
            SingleDataSwap => self.exec_arm_swp(insn),
            MoveFromStatus => self.exec_arm_mrs(insn),
            MoveToStatus | MoveToFlags => self.exec_arm_msr(insn),
            Undefined => self.arm_undefined(insn),
        }
    }

    /// Permissive handling of undefined encodings: consume a cycle, do
    /// nothing. Well formed ROMs never hit this.
    pub fn arm_undefined(&mut self, insn: u32) -> usize {
        warn!(
            "undefined ARM instruction {:08x} at @{:08x}",
            insn, self.current_pc
        );
        1
    }

    /// Branch and Branch with Link (B, BL)
    pub fn exec_arm_b_bl(&mut self, insn: u32) -> usize {
        if insn.link_flag() {
            self.set_reg(REG_LR, self.current_pc.wrapping_add(4) & !0b1);
        }

        self.pc = (self.prefetch_pc() as i32).wrapping_add(insn.branch_offset()) as u32 & !3;
        3
    }

    /// Jump to `addr`, switching instruction set according to bit 0.
    pub fn branch_exchange(&mut self, addr: Addr) -> usize {
        if addr.bit(0) {
            self.cpsr.set_state(CpuState::THUMB);
            self.pc = addr & !0x1;
        } else {
            self.cpsr.set_state(CpuState::ARM);
            self.pc = addr & !0x3;
        }
        3
    }

    /// Branch and Exchange (BX)
    pub fn exec_arm_bx(&mut self, insn: u32) -> usize {
        self.branch_exchange(self.reg_prefetch(insn.rm()))
    }

    /// Move from status register (MRS)
    pub fn exec_arm_mrs(&mut self, insn: u32) -> usize {
        let rd = insn.bit_range(12..16) as usize;
        let result = if insn.spsr_flag() {
            self.get_spsr().get()
        } else {
            self.cpsr.get()
        };
        self.set_reg(rd, result);
        1
    }

    /// Move to status register (MSR). A 4-bit field mask selects which PSR
    /// bytes are written; in User mode only the flags byte of the CPSR is
    /// writable.
    pub fn exec_arm_msr(&mut self, insn: u32) -> usize {
        let value = if insn.bit(25) {
            let immediate = insn & 0xff;
            let rotate = 2 * insn.bit_range(8..12);
            immediate.rotate_right(rotate)
        } else {
            self.get_reg(insn.rm())
        };

        let mut mask = 0u32;
        if insn.bit(19) {
            mask |= 0xff << 24;
        }
        if insn.bit(18) {
            mask |= 0xff << 16;
        }
        if insn.bit(17) {
            mask |= 0xff << 8;
        }
        if insn.bit(16) {
            mask |= 0xff;
        }

        if insn.spsr_flag() {
            if self.cpsr.mode().has_spsr() {
                let new = (self.spsr.get() & !mask) | (value & mask);
                self.spsr.set(new);
            } else {
                warn!("msr to spsr in a mode without one, ignored");
            }
            return 1;
        }

        let mask = if self.cpsr.mode() == CpuMode::User {
            mask & 0xff00_0000
        } else {
            mask
        };

        let new_psr = RegPsr::new((self.cpsr.get() & !mask) | (value & mask));
        match new_psr.try_mode() {
            Some(new_mode) => {
                let old_mode = self.cpsr.mode();
                if old_mode != new_mode {
                    self.change_mode(old_mode, new_mode);
                }
                self.cpsr = new_psr;
            }
            None => {
                // An invalid mode value is dropped; the rest of the write
                // still lands.
                warn!(
                    "msr wrote invalid mode {:#07b}, mode field ignored",
                    new_psr.get() & 0x1f
                );
                let keep_mode = self.cpsr.get() & 0x1f;
                self.cpsr = RegPsr::new((new_psr.get() & !0x1f) | keep_mode);
            }
        }
        1
    }

    /// Logical/Arithmetic ALU operations.
    ///
    /// r15 as an operand reads the prefetched address, +4 more when the
    /// shift amount comes from a register (the extra register read delays
    /// the operand fetch by one more pipeline stage).
    pub fn exec_arm_data_processing(&mut self, insn: u32) -> usize {
        use AluOpCode::*;

        let rn = insn.bit_range(16..20) as usize;
        let rd = insn.bit_range(12..16) as usize;
        let shift_by_reg = !insn.bit(25) && insn.bit(4);

        let pc_bias = if shift_by_reg { 4 } else { 0 };
        let op1 = if rn == REG_PC {
            self.prefetch_pc().wrapping_add(pc_bias)
        } else {
            self.gpr[rn]
        };

        let mut s_flag = insn.set_cond_flag();
        let opcode = insn.opcode();

        let mut carry = self.cpsr.C();
        let op2 = if insn.bit(25) {
            let immediate = insn & 0xff;
            let rotate = 2 * insn.bit_range(8..12);
            ror(immediate, rotate, &mut carry, false, true)
        } else {
            let rm = insn.rm();
            let val = if rm == REG_PC {
                self.prefetch_pc().wrapping_add(pc_bias)
            } else {
                self.gpr[rm]
            };
            if shift_by_reg {
                let amount = self.get_reg(insn.rs()) & 0xff;
                barrel_shift_op(insn.get_bs_op(), val, amount, &mut carry, false)
            } else {
                let amount = insn.bit_range(7..12);
                barrel_shift_op(insn.get_bs_op(), val, amount, &mut carry, true)
            }
        };

        if rd == REG_PC && s_flag {
            self.transfer_spsr_mode();
            s_flag = false;
        }

        let alu_res = if s_flag {
            let mut overflow = self.cpsr.V();
            let c_in = self.cpsr.C();
            let result = match opcode {
                AND | TST => op1 & op2,
                EOR | TEQ => op1 ^ op2,
                SUB | CMP => alu_sub_flags(op1, op2, &mut carry, &mut overflow),
                RSB => alu_sub_flags(op2, op1, &mut carry, &mut overflow),
                ADD | CMN => alu_add_flags(op1, op2, &mut carry, &mut overflow),
                ADC => alu_adc_flags(op1, op2, c_in, &mut carry, &mut overflow),
                SBC => alu_sbc_flags(op1, op2, c_in, &mut carry, &mut overflow),
                RSC => alu_sbc_flags(op2, op1, c_in, &mut carry, &mut overflow),
                ORR => op1 | op2,
                MOV => op2,
                BIC => op1 & !op2,
                MVN => !op2,
            };

            self.update_flags_nzcv(result, carry, overflow);

            if opcode.is_setting_flags() {
                None
            } else {
                Some(result)
            }
        } else {
            let c = self.cpsr.C() as u32;
            match opcode {
                AND => Some(op1 & op2),
                EOR => Some(op1 ^ op2),
                SUB => Some(op1.wrapping_sub(op2)),
                RSB => Some(op2.wrapping_sub(op1)),
                ADD => Some(op1.wrapping_add(op2)),
                ADC => Some(op1.wrapping_add(op2).wrapping_add(c)),
                SBC => Some(op1.wrapping_sub(op2.wrapping_add(1 - c))),
                RSC => Some(op2.wrapping_sub(op1.wrapping_add(1 - c))),
                ORR => Some(op1 | op2),
                MOV => Some(op2),
                BIC => Some(op1 & !op2),
                MVN => Some(!op2),
                // compare opcodes without S live in the PSR-transfer space;
                // an encoding that still lands here is undefined
                TST | TEQ | CMP | CMN => {
                    warn!(
                        "undefined psr-space encoding {:08x} at @{:08x}",
                        insn, self.current_pc
                    );
                    None
                }
            }
        };

        let mut cycles = 1;
        if let Some(result) = alu_res {
            self.set_reg(rd, result);
            if rd == REG_PC {
                cycles = 3; // pipeline flush
            }
        }
        cycles
    }

    /// Single data transfer (LDR/STR/LDRB/STRB)
    pub fn exec_arm_ldr_str(&mut self, insn: u32) -> usize {
        let load = insn.load_flag();
        let pre_index = insn.pre_index_flag();
        let writeback = insn.write_back_flag();
        let base_reg = insn.bit_range(16..20) as usize;
        let dest_reg = insn.bit_range(12..16) as usize;

        let base = self.reg_prefetch(base_reg);

        let offset = if insn.bit(25) {
            // register offset, scaled by an immediate-specified shift
            let mut carry = self.cpsr.C();
            let amount = insn.bit_range(7..12);
            barrel_shift_op(
                insn.get_bs_op(),
                self.reg_prefetch(insn.rm()),
                amount,
                &mut carry,
                true,
            )
        } else {
            insn.bit_range(0..12)
        };
        let offset = if insn.add_offset_flag() {
            offset
        } else {
            (offset as i32).wrapping_neg() as u32
        };

        let effective_addr = base.wrapping_add(offset);
        let addr = if pre_index { effective_addr } else { base };

        let cycles;
        if load {
            let data = if insn.transfer_size() == 1 {
                self.read_8(addr) as u32
            } else {
                self.ldr_word(addr)
            };
            self.set_reg(dest_reg, data);
            cycles = if dest_reg == REG_PC { 5 } else { 3 };
        } else {
            let value = if dest_reg == REG_PC {
                self.current_pc.wrapping_add(12)
            } else {
                self.gpr[dest_reg]
            };
            if insn.transfer_size() == 1 {
                self.write_8(addr, value as u8);
            } else {
                self.write_32(addr & !3, value);
            }
            cycles = 2;
        }

        if (!load || base_reg != dest_reg)
            && (!pre_index || writeback)
            && base_reg != REG_PC
        {
            self.set_reg(base_reg, effective_addr);
        }

        cycles
    }

    pub fn exec_arm_ldr_str_hs_reg(&mut self, insn: u32) -> usize {
        let offset = self.get_reg(insn.rm());
        let offset = if insn.add_offset_flag() {
            offset
        } else {
            (offset as i32).wrapping_neg() as u32
        };
        self.ldr_str_hs_common(insn, offset)
    }

    pub fn exec_arm_ldr_str_hs_imm(&mut self, insn: u32) -> usize {
        let offset8 = (insn.bit_range(8..12) << 4) | insn.bit_range(0..4);
        let offset8 = if insn.add_offset_flag() {
            offset8
        } else {
            (offset8 as i32).wrapping_neg() as u32
        };
        self.ldr_str_hs_common(insn, offset8)
    }

    /// Halfword and signed transfers (LDRH/STRH/LDRSB/LDRSH)
    fn ldr_str_hs_common(&mut self, insn: u32, offset: u32) -> usize {
        // SH=00 in this encoding space is reserved
        let transfer_type = match insn.halfword_data_transfer_type() {
            Some(t) => t,
            None => return self.arm_undefined(insn),
        };
        let load = insn.load_flag();
        let pre_index = insn.pre_index_flag();
        let writeback = insn.write_back_flag();
        let base_reg = insn.bit_range(16..20) as usize;
        let dest_reg = insn.bit_range(12..16) as usize;

        let base = self.reg_prefetch(base_reg);
        let effective_addr = base.wrapping_add(offset);
        let addr = if pre_index { effective_addr } else { base };

        let cycles;
        if load {
            let data = match transfer_type {
                ArmHalfwordTransferType::SignedByte => self.read_8(addr) as i8 as i32 as u32,
                ArmHalfwordTransferType::SignedHalfwords => self.ldr_sign_half(addr),
                ArmHalfwordTransferType::UnsignedHalfwords => self.ldr_half(addr),
            };
            self.set_reg(dest_reg, data);
            cycles = if dest_reg == REG_PC { 5 } else { 3 };
        } else {
            let value = if dest_reg == REG_PC {
                self.current_pc.wrapping_add(12)
            } else {
                self.gpr[dest_reg]
            };
            match transfer_type {
                ArmHalfwordTransferType::UnsignedHalfwords => {
                    self.write_16(addr & !1, value as u16);
                }
                _ => {
                    warn!("signed halfword store encoding at @{:08x}", self.current_pc);
                }
            }
            cycles = 2;
        }

        if (!load || base_reg != dest_reg)
            && (!pre_index || writeback)
            && base_reg != REG_PC
        {
            self.set_reg(base_reg, effective_addr);
        }

        cycles
    }

    /// Block data transfer (LDM/STM)
    pub fn exec_arm_ldm_stm(&mut self, insn: u32) -> usize {
        let mut full = insn.pre_index_flag();
        let ascending = insn.add_offset_flag();
        let s_flag = insn.bit(22);
        let is_load = insn.load_flag();
        let mut writeback = insn.write_back_flag();
        let base_reg = insn.bit_range(16..20) as usize;
        let mut base_addr = self.get_reg(base_reg);
        let old_base = base_addr;

        let rlist = insn.register_list();
        let rlist_count = rlist.count_ones();

        // S bit without r15 in the list addresses the user bank; with an r15
        // load it requests a CPSR restore instead.
        let user_bank_transfer = if s_flag {
            if is_load {
                !rlist.bit(REG_PC)
            } else {
                true
            }
        } else {
            false
        };
        let psr_transfer = s_flag && is_load && rlist.bit(REG_PC);

        let mut cycles = 2 + rlist_count as usize;

        if rlist != 0 && !ascending {
            base_addr = base_addr.wrapping_sub(rlist_count * 4);
            if writeback {
                self.set_reg(base_reg, base_addr);
                writeback = false;
            }
            full = !full;
        }

        let mut addr = base_addr;

        if rlist != 0 {
            if is_load {
                for r in 0..16 {
                    if !rlist.bit(r) {
                        continue;
                    }
                    if r == base_reg {
                        writeback = false;
                    }
                    if full {
                        addr = addr.wrapping_add(4);
                    }
                    let val = self.read_32(addr & !3);
                    if r == REG_PC {
                        if psr_transfer {
                            self.transfer_spsr_mode();
                        }
                        self.set_reg(REG_PC, val);
                        cycles += 2;
                    } else if user_bank_transfer {
                        self.set_reg_user(r, val);
                    } else {
                        self.gpr[r] = val;
                    }
                    if !full {
                        addr = addr.wrapping_add(4);
                    }
                }
            } else {
                let mut first = true;
                for r in 0..16 {
                    if !rlist.bit(r) {
                        continue;
                    }
                    let val = if r == base_reg {
                        if first {
                            old_base
                        } else {
                            let x = rlist_count * 4;
                            if ascending {
                                old_base.wrapping_add(x)
                            } else {
                                old_base.wrapping_sub(x)
                            }
                        }
                    } else if r == REG_PC {
                        self.current_pc.wrapping_add(12)
                    } else if user_bank_transfer {
                        self.get_reg_user(r)
                    } else {
                        self.gpr[r]
                    };

                    if full {
                        addr = addr.wrapping_add(4);
                    }
                    first = false;
                    self.write_32(addr & !3, val);
                    if !full {
                        addr = addr.wrapping_add(4);
                    }
                }
            }
        } else {
            // Empty register list transfers r15 only and moves the base by
            // 0x40 (ARMv4 quirk).
            if is_load {
                let val = self.read_32(addr & !3);
                self.set_reg(REG_PC, val & !3);
                cycles += 2;
            } else {
                let store_addr = match (ascending, full) {
                    (false, false) => addr.wrapping_sub(0x3c),
                    (false, true) => addr.wrapping_sub(0x40),
                    (true, false) => addr,
                    (true, true) => addr.wrapping_add(4),
                };
                self.write_32(store_addr & !3, self.current_pc.wrapping_add(12));
            }
            addr = if ascending {
                addr.wrapping_add(0x40)
            } else {
                addr.wrapping_sub(0x40)
            };
        }

        if writeback && base_reg != REG_PC {
            self.set_reg(base_reg, addr);
        }

        cycles
    }

    /// Multiply and Multiply-Accumulate (MUL, MLA). Low 32 bits only.
    pub fn exec_arm_mul_mla(&mut self, insn: u32) -> usize {
        let rd = insn.bit_range(16..20) as usize;
        let rn = insn.bit_range(12..16) as usize;

        let op1 = self.get_reg(insn.rm());
        let op2 = self.get_reg(insn.rs());
        let mut result = op1.wrapping_mul(op2);
        if insn.accumulate_flag() {
            result = result.wrapping_add(self.get_reg(rn));
        }
        self.set_reg(rd, result);

        if insn.set_cond_flag() {
            self.update_flags_nz(result);
        }

        2
    }

    /// Multiply Long (UMULL/UMLAL/SMULL/SMLAL)
    pub fn exec_arm_mull_mlal(&mut self, insn: u32) -> usize {
        let rd_hi = insn.rd_hi();
        let rd_lo = insn.rd_lo();

        let op1 = self.get_reg(insn.rm());
        let op2 = self.get_reg(insn.rs());
        let mut result: u64 = if insn.signed_flag() {
            (op1 as i32 as i64).wrapping_mul(op2 as i32 as i64) as u64
        } else {
            (op1 as u64).wrapping_mul(op2 as u64)
        };
        if insn.accumulate_flag() {
            let hi = self.get_reg(rd_hi) as u64;
            let lo = self.get_reg(rd_lo) as u64;
            result = result.wrapping_add(hi << 32 | lo);
        }
        self.set_reg(rd_hi, (result >> 32) as u32);
        self.set_reg(rd_lo, (result & 0xffff_ffff) as u32);

        if insn.set_cond_flag() {
            self.cpsr.set_N(result.bit(63));
            self.cpsr.set_Z(result == 0);
        }

        3
    }

    /// Single data swap (SWP/SWPB)
    pub fn exec_arm_swp(&mut self, insn: u32) -> usize {
        let base_addr = self.get_reg(insn.bit_range(16..20) as usize);
        let rd = insn.bit_range(12..16) as usize;
        if insn.transfer_size() == 1 {
            let t = self.read_8(base_addr);
            let v = self.get_reg(insn.rm()) as u8;
            self.write_8(base_addr, v);
            self.set_reg(rd, t as u32);
        } else {
            let t = self.ldr_word(base_addr);
            let v = self.get_reg(insn.rm());
            self.write_32(base_addr & !3, v);
            self.set_reg(rd, t);
        }
        4
    }

    /// Software interrupt
    pub fn exec_arm_swi(&mut self, _insn: u32) -> usize {
        self.software_interrupt();
        3
    }
}

#[cfg(test)]
/// All instruction constants were generated using an ARM assembler.
mod tests {
    use super::*;
    use crate::{Exception, SimpleMemory};
    use agbemu_utils::Shared;

    fn make_core() -> Arm7tdmiCore<SimpleMemory> {
        let bus = Shared::new(SimpleMemory::new(0x4000));
        let mut core = Arm7tdmiCore::new(bus);
        core.reset();
        core.pc = 0x100;
        core
    }

    fn step_one(core: &mut Arm7tdmiCore<SimpleMemory>, insn: u32) -> usize {
        let pc = core.pc;
        core.bus.write_32(pc, insn);
        core.step()
    }

    #[test]
    fn mov_immediate() {
        // mov r1, #1
        let mut core = make_core();
        let flags_before = core.cpsr.get() & RegPsr::FLAG_BITMASK;
        let cycles = step_one(&mut core, 0xe3a01001);
        assert_eq!(core.gpr[1], 1);
        assert_eq!(core.cpsr.get() & RegPsr::FLAG_BITMASK, flags_before);
        assert_eq!(cycles, 1);

        // movs r1, #1
        let mut core = make_core();
        core.cpsr.set_Z(true);
        step_one(&mut core, 0xe3b01001);
        assert!(!core.cpsr.Z());
        assert!(!core.cpsr.N());
    }

    #[test]
    fn adds_overflow() {
        // adds r2, r0, r1
        let mut core = make_core();
        core.gpr[0] = 0x7fff_ffff;
        core.gpr[1] = 1;
        step_one(&mut core, 0xe0902001);
        assert_eq!(core.gpr[2], 0x8000_0000);
        assert!(core.cpsr.N());
        assert!(!core.cpsr.Z());
        assert!(!core.cpsr.C());
        assert!(core.cpsr.V());
    }

    #[test]
    fn branch_with_link() {
        // bl +0xf8 at pc=0x100
        let mut core = make_core();
        let cycles = step_one(&mut core, 0xeb00003e);
        assert_eq!(core.gpr[REG_LR], 0x104);
        assert_eq!(core.pc, 0x200);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn branch_backwards_loops_in_place() {
        // b -8 (the classic idle loop)
        let mut core = make_core();
        let cycles = step_one(&mut core, 0xeafffffe);
        assert_eq!(core.pc, 0x100);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn ldr_misaligned_rotates() {
        // ldr r0, [r1]
        let mut core = make_core();
        core.bus.write_32(0x1000, 0xdead_beef);
        core.gpr[1] = 0x1002;
        let cycles = step_one(&mut core, 0xe5910000);
        assert_eq!(core.gpr[0], 0xbeef_dead);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn ldr_pc_relative_reads_prefetch() {
        // ldr r0, [pc] => loads from pc+8
        let mut core = make_core();
        core.bus.write_32(0x108, 0x1234_5678);
        step_one(&mut core, 0xe59f0000);
        assert_eq!(core.gpr[0], 0x1234_5678);
    }

    #[test]
    fn str_post_index_writes_back() {
        // str r0, [r1], #4
        let mut core = make_core();
        core.gpr[0] = 0xcafe_babe;
        core.gpr[1] = 0x1000;
        let cycles = step_one(&mut core, 0xe4810004);
        assert_eq!(core.bus.read_32(0x1000), 0xcafe_babe);
        assert_eq!(core.gpr[1], 0x1004);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn ldrh_strh_roundtrip() {
        let mut core = make_core();
        core.gpr[0] = 0xffff_1234;
        core.gpr[1] = 0x1000;
        // strh r0, [r1]
        step_one(&mut core, 0xe1c100b0);
        assert_eq!(core.bus.read_16(0x1000), 0x1234);

        // ldrsh r2, [r1]
        core.bus.write_16(0x1002, 0x8000);
        core.gpr[1] = 0x1002;
        step_one(&mut core, 0xe1d120f0);
        assert_eq!(core.gpr[2], 0xffff_8000);
    }

    #[test]
    fn swi_entry_and_exit() {
        let mut core = make_core();
        core.change_mode(CpuMode::System, CpuMode::User);
        core.pc = 0x200;
        let cpsr_before = core.cpsr;

        // swi #1
        let cycles = step_one(&mut core, 0xef000001);
        assert_eq!(cycles, 3);
        assert_eq!(core.cpsr.mode(), CpuMode::Supervisor);
        assert_eq!(core.cpsr.state(), CpuState::ARM);
        assert!(core.cpsr.irq_disabled());
        assert_eq!(core.spsr.get(), cpsr_before.get());
        assert_eq!(core.gpr[REG_LR], 0x204);
        assert_eq!(core.pc, 0x08);

        // movs pc, lr
        step_one(&mut core, 0xe1b0f00e);
        assert_eq!(core.cpsr.get(), cpsr_before.get());
        assert_eq!(core.pc, 0x204);
    }

    #[test]
    fn data_processing_pc_operand_bias() {
        // mov r0, pc => pc+8
        let mut core = make_core();
        step_one(&mut core, 0xe1a0000f);
        assert_eq!(core.gpr[0], 0x108);

        // mov r0, pc, lsl r1 (shift-by-register adds another +4)
        let mut core = make_core();
        core.gpr[1] = 0;
        step_one(&mut core, 0xe1a0011f);
        assert_eq!(core.gpr[0], 0x10c);
    }

    #[test]
    fn ldm_stm_roundtrip() {
        let mut core = make_core();
        core.gpr[13] = 0x2000;
        core.gpr[0] = 0x11;
        core.gpr[1] = 0x22;
        core.gpr[2] = 0x33;

        // stmfd sp!, {r0-r2}
        let cycles = step_one(&mut core, 0xe92d0007);
        assert_eq!(cycles, 5);
        assert_eq!(core.gpr[13], 0x2000 - 12);
        assert_eq!(core.bus.read_32(0x2000 - 12), 0x11);
        assert_eq!(core.bus.read_32(0x2000 - 8), 0x22);
        assert_eq!(core.bus.read_32(0x2000 - 4), 0x33);

        core.gpr[0] = 0;
        core.gpr[1] = 0;
        core.gpr[2] = 0;

        // ldmfd sp!, {r0-r2}
        step_one(&mut core, 0xe8bd0007);
        assert_eq!(core.gpr[13], 0x2000);
        assert_eq!((core.gpr[0], core.gpr[1], core.gpr[2]), (0x11, 0x22, 0x33));
    }

    #[test]
    fn multiply_and_long_multiply() {
        let mut core = make_core();
        core.gpr[1] = 7;
        core.gpr[2] = 6;
        // mul r0, r1, r2
        let cycles = step_one(&mut core, 0xe0000291);
        assert_eq!(core.gpr[0], 42);
        assert_eq!(cycles, 2);

        // smull r1, r2, r3, r4 : r3 * r4 -> r2:r1
        let mut core = make_core();
        core.gpr[3] = (-2i32) as u32;
        core.gpr[4] = 3;
        let cycles = step_one(&mut core, 0xe0c21493);
        assert_eq!(core.gpr[1], (-6i64) as u64 as u32);
        assert_eq!(core.gpr[2], ((-6i64) as u64 >> 32) as u32);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn swap_is_load_then_store() {
        let mut core = make_core();
        core.bus.write_32(0x1000, 0xaaaa_bbbb);
        core.gpr[1] = 0xcccc_dddd;
        core.gpr[2] = 0x1000;
        // swp r0, r1, [r2]
        let cycles = step_one(&mut core, 0xe1020091);
        assert_eq!(core.gpr[0], 0xaaaa_bbbb);
        assert_eq!(core.bus.read_32(0x1000), 0xcccc_dddd);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn msr_field_mask_and_user_restriction() {
        let mut core = make_core();
        core.gpr[0] = 0xf000_0000 | (CpuMode::Irq as u32);
        // msr cpsr_f, r0 : flags byte only
        step_one(&mut core, 0xe128f000);
        assert!(core.cpsr.N() && core.cpsr.Z() && core.cpsr.C() && core.cpsr.V());
        assert_eq!(core.cpsr.mode(), CpuMode::System);

        // msr cpsr_fc from user mode may only change the flags
        let mut core = make_core();
        core.change_mode(CpuMode::System, CpuMode::User);
        core.gpr[0] = 0x5000_0000 | (CpuMode::Fiq as u32);
        step_one(&mut core, 0xe129f000);
        assert_eq!(core.cpsr.mode(), CpuMode::User);
        assert!(core.cpsr.Z() && core.cpsr.V());
        assert!(!core.cpsr.N());
    }

    #[test]
    fn mrs_reads_packed_cpsr() {
        let mut core = make_core();
        core.cpsr.set_N(true);
        core.cpsr.set_C(true);
        // mrs r0, cpsr
        step_one(&mut core, 0xe10f0000);
        assert_eq!(core.gpr[0], core.cpsr.get());
    }

    #[test]
    fn condition_failure_costs_one_cycle() {
        let mut core = make_core();
        core.cpsr.set_Z(false);
        // moveq r0, #1
        let cycles = step_one(&mut core, 0x03a00001);
        assert_eq!(core.gpr[0], 0);
        assert_eq!(cycles, 1);
        assert_eq!(core.pc, 0x104);
    }

    #[test]
    fn bx_switches_to_thumb() {
        let mut core = make_core();
        core.gpr[0] = 0x1001;
        // bx r0
        let cycles = step_one(&mut core, 0xe12fff10);
        assert_eq!(core.pc, 0x1000);
        assert_eq!(core.cpsr.state(), CpuState::THUMB);
        assert_eq!(cycles, 3);
    }

    #[test]
    fn every_instruction_costs_at_least_one_cycle() {
        let mut core = make_core();
        let before = core.cycles;
        let c = step_one(&mut core, 0xe1a00000); // nop (mov r0, r0)
        assert!(c >= 1);
        assert_eq!(core.cycles, before + c);
    }

    #[test]
    fn irq_respects_mask_and_wakes_halted_core() {
        let mut core = make_core();
        core.halted = true;
        core.irq(); // masked at reset
        assert!(core.halted);

        core.cpsr.set_irq_disabled(false);
        let pc = core.pc;
        core.irq();
        assert!(!core.halted);
        assert_eq!(core.cpsr.mode(), CpuMode::Irq);
        assert_eq!(core.pc, Exception::Irq as u32);
        assert_eq!(core.gpr[REG_LR], pc);
    }
}
