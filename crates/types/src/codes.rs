use crate::word::Word;

/// Result word pushed by a syscall that completed normally.
pub const SUCCESS: Word = 0;

// Negative result words a syscall can leave on the caller's stack.
pub const ERROR_DEVICE_EXISTENCE: Word = -2;
/// Reserved in the error table; no syscall currently produces it.
pub const ERROR_DEVICE_NOT_USABLE: Word = -3;
pub const ERROR_DEVICE_OPEN: Word = -4;
pub const ERROR_DEVICE_NOT_OPEN: Word = -5;
pub const ERROR_DEVICE_NOT_READABLE: Word = -6;
pub const ERROR_DEVICE_NOT_WRITEABLE: Word = -7;
/// Simulation exit code when the scheduler finds an empty process table.
pub const ERROR_NO_PROCESSES: Word = -8;
pub const ERROR_NEED_MORE_SPACE: Word = -9;
