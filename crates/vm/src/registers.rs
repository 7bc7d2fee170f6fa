/// Total number of registers on the chip.
pub const NUM_REGS: usize = 9;

/// Number of general-purpose registers (`R0`..`R4`). Instruction operands
/// may only name these.
pub const NUM_GEN_REGS: usize = 5;

/// Index of each register in the register file. Used as
/// `regs[Register::Pc as usize]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    /// Program counter.
    Pc = 5,
    /// Stack pointer. The stack grows upward: a push increments, a pop
    /// decrements.
    Sp = 6,
    /// Bottom of the currently accessible RAM window.
    Base = 7,
    /// Length of the accessible window; accesses are checked against
    /// `[BASE, BASE + LIM)`.
    Lim = 8,
}
