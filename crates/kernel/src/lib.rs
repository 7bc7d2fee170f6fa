pub mod devices;
pub mod interrupts;
pub mod loader;
pub mod mem;
pub mod pcb;
pub mod scheduler;
pub mod syscall;

pub use devices::{Device, DeviceInfo, DeviceRegistry};
pub use loader::{FIRST_PID, IDLE_PID};
pub use mem::{FreeList, MemBlock};
pub use pcb::{BlockedOn, IoOp, Pcb, ProcessTable, SAVE_LOAD_TIME};
pub use scheduler::SchedPolicy;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use types::Word;
use vm::{Control, Cpu, Ram, TrapHandler};

use loader::CatalogEntry;

/// The simulated operating system: process table, device registry,
/// free-list allocator and program catalog, driven entirely through the
/// [`TrapHandler`] callbacks the CPU invokes. All kernel logic runs
/// synchronously inside those callbacks; there is no reentrancy.
#[derive(Debug)]
pub struct Sos {
    pub(crate) free_list: FreeList,
    pub(crate) devices: DeviceRegistry,
    pub(crate) table: ProcessTable,
    pub(crate) programs: Vec<CatalogEntry>,
    pub(crate) next_pid: Word,
    pub(crate) policy: SchedPolicy,
    pub(crate) rng: SmallRng,
    pub(crate) console: Vec<Word>,
}

impl Sos {
    pub fn new(ram_size: Word) -> Self {
        Self::with_seed(ram_size, rand::random())
    }

    /// Deterministic construction for tests and reproducible runs; the
    /// seed only feeds the EXEC program choice and the random scheduler
    /// policy.
    pub fn with_seed(ram_size: Word, seed: u64) -> Self {
        Self {
            free_list: FreeList::new(ram_size),
            devices: DeviceRegistry::new(),
            table: ProcessTable::new(),
            programs: Vec::new(),
            next_pid: FIRST_PID,
            policy: SchedPolicy::default(),
            rng: SmallRng::seed_from_u64(seed),
            console: Vec::new(),
        }
    }

    pub fn set_policy(&mut self, policy: SchedPolicy) {
        self.policy = policy;
    }

    /// Install a device driver under a unique id.
    pub fn register_device(&mut self, driver: Box<dyn Device>, id: Word) {
        self.devices.register(driver, id);
    }

    /// Every value the OUTPUT (and COREDUMP) syscall has printed, in
    /// order; the test harness asserts against this transcript.
    pub fn console(&self) -> &[Word] {
        &self.console
    }

    pub fn process_table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn device_registry(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free_list
    }
}

impl TrapHandler for Sos {
    fn illegal_memory_access(&mut self, cpu: &mut Cpu, ram: &mut Ram, addr: Word) -> Control {
        self.interrupt_illegal_memory_access(cpu, ram, addr)
    }

    fn divide_by_zero(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        self.interrupt_divide_by_zero(cpu, ram)
    }

    fn illegal_instruction(&mut self, cpu: &mut Cpu, ram: &mut Ram, instr: [Word; 4]) -> Control {
        self.interrupt_illegal_instruction(cpu, ram, instr)
    }

    fn system_call(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        self.dispatch_syscall(cpu, ram)
    }

    fn io_read_complete(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        dev: Word,
        addr: Word,
        data: Word,
    ) -> Control {
        self.interrupt_io_read_complete(cpu, ram, dev, addr, data)
    }

    fn io_write_complete(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        dev: Word,
        addr: Word,
    ) -> Control {
        self.interrupt_io_write_complete(cpu, ram, dev, addr)
    }

    fn clock(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        self.interrupt_clock(cpu, ram)
    }
}
