use types::Word;
use vm::instruction::{
    OP_ADD, OP_BLT, OP_BNE, OP_BRANCH, OP_COPY, OP_DIV, OP_LOAD, OP_MUL, OP_POP, OP_PUSH, OP_SAVE,
    OP_SET, OP_SUB, OP_TRAP,
};

use crate::Program;

/// Assembles program images one instruction at a time. Register operands
/// are general-register indexes (0..=4); branch targets are BASE-relative
/// word offsets, usually taken from [`ProgramBuilder::here`].
///
/// ```
/// use program::ProgramBuilder;
///
/// let prog = ProgramBuilder::new()
///     .set(0, 3)      // r0 = 3 (the OPEN syscall)
///     .push(0)
///     .trap()
///     .pop(4)         // result word
///     .build("open-once");
/// assert_eq!(prog.len(), 16);
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    words: Vec<Word>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// BASE-relative offset of the next instruction to be emitted.
    pub fn here(&self) -> Word {
        self.words.len() as Word
    }

    fn emit(mut self, cell: [Word; 4]) -> Self {
        self.words.extend_from_slice(&cell);
        self
    }

    pub fn set(self, reg: usize, value: Word) -> Self {
        self.emit([OP_SET, reg as Word, value, 0])
    }

    pub fn add(self, dst: usize, lhs: usize, rhs: usize) -> Self {
        self.emit([OP_ADD, dst as Word, lhs as Word, rhs as Word])
    }

    pub fn sub(self, dst: usize, lhs: usize, rhs: usize) -> Self {
        self.emit([OP_SUB, dst as Word, lhs as Word, rhs as Word])
    }

    pub fn mul(self, dst: usize, lhs: usize, rhs: usize) -> Self {
        self.emit([OP_MUL, dst as Word, lhs as Word, rhs as Word])
    }

    pub fn div(self, dst: usize, lhs: usize, rhs: usize) -> Self {
        self.emit([OP_DIV, dst as Word, lhs as Word, rhs as Word])
    }

    pub fn copy(self, dst: usize, src: usize) -> Self {
        self.emit([OP_COPY, dst as Word, src as Word, 0])
    }

    pub fn branch(self, target: Word) -> Self {
        self.emit([OP_BRANCH, target, 0, 0])
    }

    pub fn bne(self, lhs: usize, rhs: usize, target: Word) -> Self {
        self.emit([OP_BNE, lhs as Word, rhs as Word, target])
    }

    pub fn blt(self, lhs: usize, rhs: usize, target: Word) -> Self {
        self.emit([OP_BLT, lhs as Word, rhs as Word, target])
    }

    pub fn pop(self, reg: usize) -> Self {
        self.emit([OP_POP, reg as Word, 0, 0])
    }

    pub fn push(self, reg: usize) -> Self {
        self.emit([OP_PUSH, reg as Word, 0, 0])
    }

    pub fn load(self, reg: usize, addr_reg: usize) -> Self {
        self.emit([OP_LOAD, reg as Word, addr_reg as Word, 0])
    }

    pub fn save(self, reg: usize, addr_reg: usize) -> Self {
        self.emit([OP_SAVE, reg as Word, addr_reg as Word, 0])
    }

    pub fn trap(self) -> Self {
        self.emit([OP_TRAP, 0, 0, 0])
    }

    pub fn build(self, name: impl Into<String>) -> Program {
        Program::new(name, self.words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::INSTR_SIZE;

    #[test]
    fn emits_fixed_width_cells() {
        let prog = ProgramBuilder::new().set(0, 9).push(0).trap().build("t");
        assert_eq!(prog.len() % INSTR_SIZE, 0);
        assert_eq!(
            prog.words(),
            &[OP_SET, 0, 9, 0, OP_PUSH, 0, 0, 0, OP_TRAP, 0, 0, 0]
        );
    }

    #[test]
    fn here_tracks_the_next_offset() {
        let b = ProgramBuilder::new().set(0, 0).set(1, 1);
        assert_eq!(b.here(), 2 * INSTR_SIZE);
    }
}
