use bit::BitIndex;

#[derive(Debug, Primitive, Eq, PartialEq, Copy, Clone)]
pub enum AluOpCode {
    AND = 0b0000,
    EOR = 0b0001,
    SUB = 0b0010,
    RSB = 0b0011,
    ADD = 0b0100,
    ADC = 0b0101,
    SBC = 0b0110,
    RSC = 0b0111,
    TST = 0b1000,
    TEQ = 0b1001,
    CMP = 0b1010,
    CMN = 0b1011,
    ORR = 0b1100,
    MOV = 0b1101,
    BIC = 0b1110,
    MVN = 0b1111,
}

impl AluOpCode {
    pub fn is_setting_flags(&self) -> bool {
        use AluOpCode::*;
        matches!(self, TST | TEQ | CMP | CMN)
    }

    pub fn is_arithmetic(&self) -> bool {
        use AluOpCode::*;
        matches!(self, ADD | ADC | SUB | SBC | RSB | RSC | CMP | CMN)
    }
}

#[derive(Debug, PartialEq, Primitive, Copy, Clone)]
pub enum BarrelShiftOpCode {
    LSL = 0,
    LSR = 1,
    ASR = 2,
    ROR = 3,
}

pub fn lsl(val: u32, amount: u32, carry: &mut bool) -> u32 {
    match amount {
        0 => val,
        x if x < 32 => {
            *carry = val.wrapping_shr(32 - x) & 1 == 1;
            val << x
        }
        32 => {
            *carry = val & 1 == 1;
            0
        }
        _ => {
            *carry = false;
            0
        }
    }
}

/// LSR #0 in a shift-by-immediate encoding means LSR #32; in a
/// shift-by-register encoding it is a pass-through.
pub fn lsr(val: u32, amount: u32, carry: &mut bool, immediate: bool) -> u32 {
    if amount != 0 {
        match amount {
            x if x < 32 => {
                *carry = (val >> (amount - 1) & 1) == 1;
                val >> amount
            }
            32 => {
                *carry = val.bit(31);
                0
            }
            _ => {
                *carry = false;
                0
            }
        }
    } else if immediate {
        *carry = val.bit(31);
        0
    } else {
        val
    }
}

pub fn asr(val: u32, amount: u32, carry: &mut bool, immediate: bool) -> u32 {
    let amount = if immediate && amount == 0 { 32 } else { amount };
    match amount {
        0 => val,
        x if x < 32 => {
            *carry = val.wrapping_shr(x - 1) & 1 == 1;
            (val as i32).wrapping_shr(x) as u32
        }
        _ => {
            let bit31 = val.bit(31);
            *carry = bit31;
            if bit31 {
                0xffffffff
            } else {
                0
            }
        }
    }
}

pub fn rrx(val: u32, carry: &mut bool) -> u32 {
    let old_c = *carry as i32;
    *carry = val & 0b1 != 0;
    ((val >> 1) as i32 | (old_c << 31)) as u32
}

/// ROR #0 in a shift-by-immediate encoding is RRX; in a shift-by-register
/// encoding it is a pass-through. Amounts beyond 31 wrap modulo 32, with the
/// multiple-of-32 case yielding the value unchanged and carry from bit 31.
pub fn ror(val: u32, amount: u32, carry: &mut bool, immediate: bool, rrx_on_zero: bool) -> u32 {
    match amount {
        0 => {
            if immediate && rrx_on_zero {
                rrx(val, carry)
            } else {
                val
            }
        }
        _ => {
            let amount = amount % 32;
            let val = if amount != 0 {
                val.rotate_right(amount)
            } else {
                val
            };
            *carry = val.bit(31);
            val
        }
    }
}

#[inline]
pub fn barrel_shift_op(
    shift: BarrelShiftOpCode,
    val: u32,
    amount: u32,
    carry: &mut bool,
    immediate: bool,
) -> u32 {
    //
    // From GBATEK:
    // Zero Shift Amount (Shift Register by Immediate, with Immediate=0)
    //  LSL#0: No shift performed, ie. directly Op2=Rm, the C flag is NOT affected.
    //  LSR#0: Interpreted as LSR#32, ie. Op2 becomes zero, C becomes Bit 31 of Rm.
    //  ASR#0: Interpreted as ASR#32, ie. Op2 and C are filled by Bit 31 of Rm.
    //  ROR#0: Interpreted as RRX#1 (RCR), like ROR#1, but Op2 Bit 31 set to old C.
    //
    // From ARM7TDMI Datasheet:
    // 1 LSL by 32 has result zero, carry out equal to bit 0 of Rm.
    // 2 LSL by more than 32 has result zero, carry out zero.
    // 3 LSR by 32 has result zero, carry out equal to bit 31 of Rm.
    // 4 LSR by more than 32 has result zero, carry out zero.
    // 5 ASR by 32 or more has result filled with and carry out equal to bit 31 of Rm.
    // 6 ROR by 32 has result equal to Rm, carry out equal to bit 31 of Rm.
    // 7 ROR by n where n is greater than 32 will give the same result and carry out
    //   as ROR by n-32; therefore repeatedly subtract 32 from n until the amount is
    //   in the range 1 to 32 and see above.
    //
    match shift {
        BarrelShiftOpCode::LSL => lsl(val, amount, carry),
        BarrelShiftOpCode::LSR => lsr(val, amount, carry, immediate),
        BarrelShiftOpCode::ASR => asr(val, amount, carry, immediate),
        BarrelShiftOpCode::ROR => ror(val, amount, carry, immediate, true),
    }
}

/// a + b, reporting unsigned carry-out and signed overflow.
pub fn alu_add_flags(a: u32, b: u32, carry: &mut bool, overflow: &mut bool) -> u32 {
    let res = (a as u64).wrapping_add(b as u64);
    *carry = res > 0xffffffff;
    *overflow = (!(a ^ b) & (a ^ (res as u32))).bit(31);
    res as u32
}

/// a + b + c, the ADC form of the adder.
pub fn alu_adc_flags(a: u32, b: u32, c: bool, carry: &mut bool, overflow: &mut bool) -> u32 {
    let res = (a as u64) + (b as u64) + (c as u64);
    *carry = res > 0xffffffff;
    *overflow = (!(a ^ b) & (b ^ (res as u32))).bit(31);
    res as u32
}

/// a - b with the ARM carry convention: carry means "no borrow", so
/// carry is set when a >= b.
pub fn alu_sub_flags(a: u32, b: u32, carry: &mut bool, overflow: &mut bool) -> u32 {
    let res = a.wrapping_sub(b);
    *carry = b <= a;
    *overflow = (a as i32).overflowing_sub(b as i32).1;
    res
}

/// a - b - !c, the SBC form; defined through the adder like the hardware does.
pub fn alu_sbc_flags(a: u32, b: u32, c: bool, carry: &mut bool, overflow: &mut bool) -> u32 {
    alu_adc_flags(a, !b, c, carry, overflow)
}
