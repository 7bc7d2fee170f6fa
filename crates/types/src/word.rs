/// The machine word. Every RAM cell, register and stack value is one of
/// these; addresses and sizes are carried in words as well.
pub type Word = i32;

/// Fixed instruction width in words: one opcode cell plus up to three
/// argument cells.
pub const INSTR_SIZE: Word = 4;
