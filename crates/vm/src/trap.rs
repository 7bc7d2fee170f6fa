use types::Word;

use crate::cpu::Cpu;
use crate::ram::Ram;

/// What the run loop should do after a trap handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Terminate the simulation with the given exit word.
    Exit(Word),
}

/// The capability set the operating system hands to the CPU. Every
/// interaction between executing user code and the kernel flows through
/// these seven callbacks; each receives the live CPU and RAM.
///
/// Handlers run to completion before the next instruction executes, so
/// the kernel never observes reentrancy.
pub trait TrapHandler {
    /// A user access fell outside the `[BASE, BASE + LIM)` window.
    fn illegal_memory_access(&mut self, cpu: &mut Cpu, ram: &mut Ram, addr: Word) -> Control;

    fn divide_by_zero(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control;

    /// The fetched cell did not decode; `instr` is the raw 4-word cell.
    fn illegal_instruction(&mut self, cpu: &mut Cpu, ram: &mut Ram, instr: [Word; 4]) -> Control;

    /// TRAP executed; the syscall opcode is on top of the user stack.
    fn system_call(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control;

    fn io_read_complete(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        dev: Word,
        addr: Word,
        data: Word,
    ) -> Control;

    fn io_write_complete(&mut self, cpu: &mut Cpu, ram: &mut Ram, dev: Word, addr: Word)
        -> Control;

    /// Clock tick boundary (`ticks % CLOCK_FREQ == 0`).
    fn clock(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control;
}
