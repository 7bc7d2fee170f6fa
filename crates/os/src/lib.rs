pub mod devices;

pub use devices::SimDevice;

use kernel::{Device, Sos};
use program::Program;
use types::Word;
use vm::{Control, Cpu, InterruptController, Ram, SharedInterrupts};

/// The assembled machine: CPU, RAM and the operating system, wired
/// through a shared interrupt controller. Device drivers built with
/// [`Computer::interrupts`] post their completions into the same
/// controller the CPU polls.
#[derive(Debug)]
pub struct Computer {
    cpu: Cpu,
    ram: Ram,
    sos: Sos,
    interrupts: SharedInterrupts,
}

impl Computer {
    pub fn new(ram_size: Word) -> Self {
        Self::assemble(ram_size, Sos::new(ram_size))
    }

    /// Deterministic machine for tests and reproducible runs.
    pub fn with_seed(ram_size: Word, seed: u64) -> Self {
        Self::assemble(ram_size, Sos::with_seed(ram_size, seed))
    }

    fn assemble(ram_size: Word, sos: Sos) -> Self {
        let interrupts = InterruptController::shared();
        Self {
            cpu: Cpu::new(interrupts.clone()),
            ram: Ram::new(ram_size as usize),
            sos,
            interrupts,
        }
    }

    /// Handle for wiring device drivers to the interrupt controller.
    pub fn interrupts(&self) -> SharedInterrupts {
        self.interrupts.clone()
    }

    pub fn sos(&self) -> &Sos {
        &self.sos
    }

    pub fn sos_mut(&mut self) -> &mut Sos {
        &mut self.sos
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn register_device(&mut self, driver: Box<dyn Device>, id: Word) {
        self.sos.register_device(driver, id);
    }

    /// Register a program in the catalog EXEC chooses from.
    pub fn add_program(&mut self, program: Program) {
        self.sos.add_program(program);
    }

    /// Load a program and make it the current process; the usual way to
    /// seed the machine before [`Computer::run`]. Returns false when RAM
    /// cannot fit it.
    pub fn launch(&mut self, program: &Program) -> bool {
        self.sos.load_program(program, &mut self.cpu, &mut self.ram)
    }

    /// Execute a single instruction cycle; tests use this to observe
    /// intermediate machine states.
    pub fn step(&mut self) -> Control {
        self.cpu.step(&mut self.ram, &mut self.sos)
    }

    /// Drive the machine until the kernel halts it; returns the exit
    /// word (`ERROR_NO_PROCESSES` once the process table drains).
    pub fn run(&mut self) -> Word {
        self.cpu.run(&mut self.ram, &mut self.sos)
    }
}
