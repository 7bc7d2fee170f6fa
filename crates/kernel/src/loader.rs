use log::debug;
use program::Program;
use types::Word;
use vm::instruction::{OP_PUSH, OP_SET, OP_TRAP};
use vm::{Cpu, Ram};

use crate::pcb::Pcb;
use crate::Sos;

/// Pid reserved for the synthetic idle process.
pub const IDLE_PID: Word = 999;

/// First pid handed to a loaded process; the counter only goes up.
pub const FIRST_PID: Word = 1001;

/// A registered program plus how many times EXEC has launched it.
#[derive(Debug)]
pub(crate) struct CatalogEntry {
    pub(crate) program: Program,
    pub(crate) call_count: u32,
}

/// The idle stub: `SET r0,0; SET r0,0; PUSH r0; TRAP` pushes the EXIT
/// opcode and traps. Exactly four instructions, sixteen words.
#[rustfmt::skip]
const IDLE_IMAGE: [Word; 16] = [
    OP_SET, 0, 0, 0,
    OP_SET, 0, 0, 0,
    OP_PUSH, 0, 0, 0,
    OP_TRAP, 0, 0, 0,
];

/// Words allocated for the idle process. The stack overlays the TRAP
/// cell's unused argument words (SP starts at BASE+12, so the single
/// push writes BASE+13), keeping the stub inside its own window.
const IDLE_FOOTPRINT: Word = IDLE_IMAGE.len() as Word;
const IDLE_SP_OFFSET: Word = 12;

impl Sos {
    /// Register a program for EXEC to choose from.
    pub fn add_program(&mut self, program: Program) {
        self.programs.push(CatalogEntry {
            program,
            call_count: 0,
        });
    }

    pub(crate) fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Load a program image into a fresh address space and make it the
    /// current process. The outgoing current process is saved first so
    /// compaction (if allocation triggers it) works from authoritative
    /// snapshots. Returns false when no layout fits even after
    /// compaction.
    pub fn load_program(&mut self, program: &Program, cpu: &mut Cpu, ram: &mut Ram) -> bool {
        let len = program.len();
        let alloc_size = program.default_alloc_size().unwrap_or(len * 2).max(len);

        if let Some(pcb) = self.table.current_mut() {
            if !pcb.is_blocked() {
                pcb.save(cpu);
            }
        }

        let base = match self.alloc_block(alloc_size, cpu, ram) {
            Some(base) => base,
            None => return false,
        };

        cpu.set_base(base);
        cpu.set_lim(alloc_size);
        cpu.set_pc(base);
        cpu.set_sp(base + len);
        ram.load(base, program.words());

        let pid = self.next_pid;
        self.next_pid += 1;
        self.table.push(Pcb::new(pid, cpu));
        self.table.set_current(Some(pid));

        debug!(
            "loaded {:?} as process {} at [{}, {}) sp={}",
            program.name(),
            pid,
            base,
            base + alloc_size,
            cpu.sp()
        );
        debug!("{}", self.table.dump());
        debug!("{}", self.dump_memory_map());
        true
    }

    /// EXEC's path into the loader: launch the catalog entry at `index`.
    pub(crate) fn create_process(&mut self, index: usize, cpu: &mut Cpu, ram: &mut Ram) -> bool {
        let program = self.programs[index].program.clone();
        self.load_program(&program, cpu, ram)
    }

    /// Inject the idle stub when every real process is blocked, buying
    /// ticks until device I/O completes. Allocation failure is a silent
    /// skip; the machine retries at the next scheduling point.
    pub(crate) fn create_idle_process(&mut self, cpu: &mut Cpu, ram: &mut Ram) {
        let base = match self.alloc_block(IDLE_FOOTPRINT, cpu, ram) {
            Some(base) => base,
            None => return,
        };
        ram.load(base, &IDLE_IMAGE);

        if let Some(pcb) = self.table.current_mut() {
            if !pcb.is_blocked() {
                pcb.save(cpu);
            }
        }

        cpu.set_base(base);
        cpu.set_lim(IDLE_FOOTPRINT);
        cpu.set_pc(base);
        cpu.set_sp(base + IDLE_SP_OFFSET);

        self.table.push(Pcb::new(IDLE_PID, cpu));
        self.table.set_current(Some(IDLE_PID));
        debug!("idle process injected at {}", base);
    }

    /// Tear down the current process: free its window, drop it from
    /// every device's opener set and from the table. The caller
    /// schedules a successor.
    pub(crate) fn remove_current_process(&mut self) {
        let Some(pid) = self.table.current_pid() else {
            return;
        };
        if let Some(pcb) = self.table.remove(pid) {
            self.free_list.free(pcb.base(), pcb.lim());
            self.devices.sweep(pid);
            debug!("process {} removed", pid);
        }
    }
}
