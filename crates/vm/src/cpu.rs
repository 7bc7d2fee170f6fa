use log::trace;
use types::{Word, INSTR_SIZE};

use crate::instruction::{decode, Instr};
use crate::interrupt::{Interrupt, SharedInterrupts};
use crate::ram::Ram;
use crate::registers::{Register, NUM_GEN_REGS, NUM_REGS};
use crate::trap::{Control, TrapHandler};

/// A clock interrupt fires whenever `ticks % CLOCK_FREQ == 0`.
pub const CLOCK_FREQ: u64 = 5;

/// The simulated processor: a 9-word register file, a tick counter and a
/// handle on the interrupt controller it polls between instructions.
///
/// The CPU owns no memory and no kernel state; it calls out through the
/// [`TrapHandler`] capability set for every trap, syscall and interrupt.
#[derive(Debug)]
pub struct Cpu {
    pub regs: [Word; NUM_REGS],
    ticks: u64,
    interrupts: SharedInterrupts,
}

impl Cpu {
    pub fn new(interrupts: SharedInterrupts) -> Self {
        Self {
            regs: [0; NUM_REGS],
            ticks: 0,
            interrupts,
        }
    }

    pub fn pc(&self) -> Word {
        self.regs[Register::Pc as usize]
    }

    pub fn set_pc(&mut self, v: Word) {
        self.regs[Register::Pc as usize] = v;
    }

    pub fn sp(&self) -> Word {
        self.regs[Register::Sp as usize]
    }

    pub fn set_sp(&mut self, v: Word) {
        self.regs[Register::Sp as usize] = v;
    }

    pub fn base(&self) -> Word {
        self.regs[Register::Base as usize]
    }

    pub fn set_base(&mut self, v: Word) {
        self.regs[Register::Base as usize] = v;
    }

    pub fn lim(&self) -> Word {
        self.regs[Register::Lim as usize]
    }

    pub fn set_lim(&mut self, v: Word) {
        self.regs[Register::Lim as usize] = v;
    }

    /// CPU cycles elapsed since power-on, including context-switch
    /// penalties added via [`Cpu::add_ticks`].
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn add_ticks(&mut self, n: u64) {
        self.ticks += n;
    }

    /// Push a value onto the current stack: increment SP, then write.
    pub fn push(&mut self, ram: &mut Ram, value: Word) {
        self.set_sp(self.sp() + 1);
        ram.write(self.sp(), value);
    }

    /// Pop a value off the current stack: read, then decrement SP.
    pub fn pop(&mut self, ram: &mut Ram) -> Word {
        let value = ram.read(self.sp());
        self.set_sp(self.sp() - 1);
        value
    }

    fn in_window(&self, addr: Word) -> bool {
        addr >= self.base() && addr < self.base() + self.lim()
    }

    /// One-line register dump, used by COREDUMP and fault reporting.
    pub fn dump_registers(&self) -> String {
        let mut out = String::new();
        for i in 0..NUM_GEN_REGS {
            out.push_str(&format!("r{}={} ", i, self.regs[i]));
        }
        out.push_str(&format!(
            "PC={} SP={} BASE={} LIM={}",
            self.pc(),
            self.sp(),
            self.base(),
            self.lim()
        ));
        out
    }

    /// Execute one instruction cycle: poll at most one pending I/O
    /// interrupt, fetch and execute the instruction at PC, advance the
    /// clock (possibly preempting), then step PC past the instruction.
    ///
    /// A mid-instruction fault dispatches its handler and abandons the
    /// rest of the instruction; the tick and PC increment still apply,
    /// so a handler that switched processes leaves the incoming process
    /// at the usual post-instruction boundary.
    pub fn step(&mut self, ram: &mut Ram, os: &mut dyn TrapHandler) -> Control {
        let pending = self.interrupts.borrow_mut().poll();
        if let Some(event) = pending {
            trace!("interrupt: {:?}", event);
            let flow = match event {
                Interrupt::ReadDone { dev, addr, data } => {
                    os.io_read_complete(self, ram, dev, addr, data)
                }
                Interrupt::WriteDone { dev, addr } => os.io_write_complete(self, ram, dev, addr),
            };
            if let Control::Exit(code) = flow {
                return Control::Exit(code);
            }
        }

        let pc = self.pc();
        let flow = if pc < 0 || pc + INSTR_SIZE > ram.size() {
            os.illegal_memory_access(self, ram, pc)
        } else {
            let cell = [
                ram.read(pc),
                ram.read(pc + 1),
                ram.read(pc + 2),
                ram.read(pc + 3),
            ];
            match decode(cell) {
                Some(instr) => {
                    trace!("[{}] {}", pc, instr);
                    self.execute(instr, ram, os)
                }
                None => os.illegal_instruction(self, ram, cell),
            }
        };
        if let Control::Exit(code) = flow {
            return Control::Exit(code);
        }

        self.ticks += 1;
        if self.ticks % CLOCK_FREQ == 0 {
            if let Control::Exit(code) = os.clock(self, ram) {
                return Control::Exit(code);
            }
        }

        self.set_pc(self.pc() + INSTR_SIZE);
        Control::Continue
    }

    fn execute(&mut self, instr: Instr, ram: &mut Ram, os: &mut dyn TrapHandler) -> Control {
        match instr {
            Instr::Set { reg, value } => self.regs[reg] = value,
            Instr::Add { dst, lhs, rhs } => {
                self.regs[dst] = self.regs[lhs].wrapping_add(self.regs[rhs])
            }
            Instr::Sub { dst, lhs, rhs } => {
                self.regs[dst] = self.regs[lhs].wrapping_sub(self.regs[rhs])
            }
            Instr::Mul { dst, lhs, rhs } => {
                self.regs[dst] = self.regs[lhs].wrapping_mul(self.regs[rhs])
            }
            Instr::Div { dst, lhs, rhs } => {
                if self.regs[rhs] == 0 {
                    return os.divide_by_zero(self, ram);
                }
                self.regs[dst] = self.regs[lhs].wrapping_div(self.regs[rhs]);
            }
            Instr::Copy { dst, src } => self.regs[dst] = self.regs[src],
            Instr::Branch { target } => {
                let dest = self.base() + target;
                if !self.in_window(dest) {
                    return os.illegal_memory_access(self, ram, dest);
                }
                self.set_pc(dest - INSTR_SIZE);
            }
            Instr::Bne { lhs, rhs, target } => {
                let dest = self.base() + target;
                if !self.in_window(dest) {
                    return os.illegal_memory_access(self, ram, dest);
                }
                if self.regs[lhs] != self.regs[rhs] {
                    self.set_pc(dest - INSTR_SIZE);
                }
            }
            Instr::Blt { lhs, rhs, target } => {
                let dest = self.base() + target;
                if !self.in_window(dest) {
                    return os.illegal_memory_access(self, ram, dest);
                }
                if self.regs[lhs] < self.regs[rhs] {
                    self.set_pc(dest - INSTR_SIZE);
                }
            }
            Instr::Pop { reg } => {
                if !self.in_window(self.sp()) {
                    return os.illegal_memory_access(self, ram, self.sp());
                }
                self.regs[reg] = self.pop(ram);
            }
            Instr::Push { reg } => {
                if !self.in_window(self.sp() + 1) {
                    return os.illegal_memory_access(self, ram, self.sp() + 1);
                }
                let value = self.regs[reg];
                self.push(ram, value);
            }
            Instr::Load { reg, addr_reg } => {
                let addr = self.regs[addr_reg] + self.base();
                if !self.in_window(addr) {
                    return os.illegal_memory_access(self, ram, addr);
                }
                self.regs[reg] = ram.read(addr);
            }
            Instr::Save { reg, addr_reg } => {
                let addr = self.regs[addr_reg] + self.base();
                if !self.in_window(addr) {
                    return os.illegal_memory_access(self, ram, addr);
                }
                ram.write(addr, self.regs[reg]);
            }
            Instr::Trap => return os.system_call(self, ram),
        }
        Control::Continue
    }

    /// Drive [`Cpu::step`] until a handler halts the machine; returns the
    /// exit word.
    pub fn run(&mut self, ram: &mut Ram, os: &mut dyn TrapHandler) -> Word {
        loop {
            if let Control::Exit(code) = self.step(ram, os) {
                return code;
            }
        }
    }
}
