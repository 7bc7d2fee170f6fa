pub mod codes;
pub mod word;

pub use codes::*;
pub use word::{Word, INSTR_SIZE};
