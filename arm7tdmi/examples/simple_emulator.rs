use log::info;
use simple_logger::SimpleLogger;

use arm7tdmi::{Arm7tdmiCore, SimpleMemory};

use agbemu_utils::Shared;

/// A tiny program computing 10! into r0, assembled by hand:
///
/// ```asm
///     mov   r0, #1
///     mov   r1, #10
/// loop:
///     mul   r0, r1, r0
///     subs  r1, r1, #1
///     bne   loop
/// halt:
///     b     halt
/// ```
const PROGRAM: &[u32] = &[
    0xe3a00001, // mov r0, #1
    0xe3a0100a, // mov r1, #10
    0xe0000091, // mul r0, r1, r0
    0xe2511001, // subs r1, r1, #1
    0x1afffffc, // bne loop
    0xeafffffe, // b halt
];

fn main() {
    SimpleLogger::new().init().unwrap();

    let mut memory = SimpleMemory::new(0x4000);
    let program: Vec<u8> = PROGRAM.iter().flat_map(|w| w.to_le_bytes()).collect();
    memory.load_program(&program);

    let bus = Shared::new(memory);
    let mut cpu = Arm7tdmiCore::new(bus);
    cpu.reset();
    cpu.pc = 0;

    // run until the program settles into its halt loop
    while cpu.pc != 0x14 {
        cpu.step();
    }

    info!("program finished after {} cycles", cpu.cycles);
    println!("{}", cpu);
    assert_eq!(cpu.gpr[0], 3628800);
}
