use std::fmt;

use types::Word;
use vm::{Cpu, Ram, Register, NUM_GEN_REGS, NUM_REGS};

/// Ticks charged to the CPU clock for every register save and every
/// restore; the simulated cost of a context switch.
pub const SAVE_LOAD_TIME: u64 = 30;

/// The device operation a blocked process is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Read,
    Write,
}

/// The (device, operation, address) tuple a blocked process waits for.
/// The device is identified by id, never by reference: the registry and
/// the table stay decoupled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedOn {
    pub dev: Word,
    pub op: IoOp,
    pub addr: Word,
}

/// Process control block: the saved register file (stale while the
/// process is running), the block state, and scheduling statistics.
///
/// PCBs order by saved BASE, which is what compaction sorts on.
#[derive(Debug, Clone)]
pub struct Pcb {
    pid: Word,
    registers: [Word; NUM_REGS],
    blocked: Option<BlockedOn>,
    last_ready_time: u64,
    num_ready: u32,
    max_starve: u64,
    avg_starve: f64,
    total_run_time: u64,
    last_start_time: u64,
    last_end_time: u64,
}

impl Pcb {
    /// Create a PCB for a process whose registers have just been set up
    /// on the CPU; the snapshot starts out authoritative.
    pub fn new(pid: Word, cpu: &Cpu) -> Self {
        Self {
            pid,
            registers: cpu.regs,
            blocked: None,
            last_ready_time: cpu.ticks(),
            num_ready: 0,
            max_starve: 0,
            avg_starve: 0.0,
            total_run_time: 0,
            last_start_time: cpu.ticks(),
            last_end_time: cpu.ticks(),
        }
    }

    pub fn pid(&self) -> Word {
        self.pid
    }

    pub fn register(&self, r: Register) -> Word {
        self.registers[r as usize]
    }

    pub fn set_register(&mut self, r: Register, value: Word) {
        self.registers[r as usize] = value;
    }

    pub fn base(&self) -> Word {
        self.register(Register::Base)
    }

    pub fn lim(&self) -> Word {
        self.register(Register::Lim)
    }

    pub fn sp(&self) -> Word {
        self.register(Register::Sp)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    pub fn blocked_on(&self) -> Option<BlockedOn> {
        self.blocked
    }

    /// Does this process wait for exactly this completion? The address
    /// only matters for READ/WRITE; OPEN waiters match any address.
    pub fn is_blocked_for(&self, dev: Word, op: IoOp, addr: Word) -> bool {
        match self.blocked {
            Some(b) => b.dev == dev && b.op == op && (op == IoOp::Open || b.addr == addr),
            None => false,
        }
    }

    pub fn last_ready_time(&self) -> u64 {
        self.last_ready_time
    }

    pub fn max_starve(&self) -> u64 {
        self.max_starve
    }

    pub fn avg_starve(&self) -> f64 {
        self.avg_starve
    }

    pub fn avg_run_time(&self) -> u64 {
        if self.num_ready > 0 {
            self.total_run_time / self.num_ready as u64
        } else {
            0
        }
    }

    /// Snapshot the CPU registers into this PCB as the process leaves the
    /// Running state, charging the context-switch penalty and recording
    /// ready-queue entry for the starvation statistics.
    pub fn save(&mut self, cpu: &mut Cpu) {
        self.last_end_time = cpu.ticks();
        cpu.add_ticks(SAVE_LOAD_TIME);
        self.registers = cpu.regs;
        self.num_ready += 1;
        self.last_ready_time = cpu.ticks();
        self.total_run_time += self.last_end_time - self.last_start_time;
    }

    /// Load the saved registers back onto the CPU and fold the elapsed
    /// starve time into the running average.
    pub fn restore(&mut self, cpu: &mut Cpu) {
        cpu.add_ticks(SAVE_LOAD_TIME);
        cpu.regs = self.registers;

        let starve = cpu.ticks() - self.last_ready_time;
        if starve > self.max_starve {
            self.max_starve = starve;
        }
        let n = self.num_ready.max(1) as f64;
        self.avg_starve = self.avg_starve * (n - 1.0) / n + starve as f64 / n;
        self.last_start_time = cpu.ticks();
    }

    /// Park this process waiting on a device. Saves the registers so the
    /// snapshot SP/BASE reflect the caller at block time; completion
    /// handlers write result words relative to that saved SP.
    pub fn block(&mut self, cpu: &mut Cpu, dev: Word, op: IoOp, addr: Word) {
        self.blocked = Some(BlockedOn { dev, op, addr });
        self.save(cpu);
    }

    /// Blocked -> Ready; the wake time counts as ready-queue entry.
    pub fn unblock(&mut self, now: u64) {
        self.blocked = None;
        self.last_ready_time = now;
    }

    /// Relocate this process's window to `new_base`, rewriting RAM and
    /// sliding the saved BASE/PC/SP (LIM is a length and is untouched).
    /// When the process is the one currently on the CPU, pass the CPU so
    /// the live registers move with it; the snapshot must be fresh.
    pub fn move_to(&mut self, new_base: Word, ram: &mut Ram, cpu: Option<&mut Cpu>) {
        let old_base = self.base();
        let lim = self.lim();
        let delta = new_base - old_base;

        let image: Vec<Word> = (0..lim).map(|i| ram.read(old_base + i)).collect();
        ram.load(new_base, &image);

        self.set_register(Register::Base, new_base);
        self.set_register(Register::Pc, self.register(Register::Pc) + delta);
        self.set_register(Register::Sp, self.sp() + delta);

        if let Some(cpu) = cpu {
            cpu.set_base(new_base);
            cpu.set_pc(self.register(Register::Pc));
            cpu.set_sp(self.sp());
        }
    }
}

impl fmt::Display for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process {} ", self.pid)?;
        match self.blocked {
            Some(b) => write!(f, "BLOCKED for {:?} @{} on device #{}: ", b.op, b.addr, b.dev)?,
            None => write!(f, "READY: ")?,
        }
        for i in 0..NUM_GEN_REGS {
            write!(f, "r{}={} ", i, self.registers[i])?;
        }
        write!(
            f,
            "PC={} SP={} BASE={} LIM={} (max starve {} avg starve {:.1})",
            self.register(Register::Pc),
            self.sp(),
            self.base(),
            self.lim(),
            self.max_starve,
            self.avg_starve
        )
    }
}

/// Insertion-ordered table of live processes plus the identity of the
/// one currently on the CPU. Scan order is creation order, which gives
/// the FIFO wake-up the device protocol relies on.
#[derive(Debug, Default)]
pub struct ProcessTable {
    procs: Vec<Pcb>,
    current: Option<Word>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn push(&mut self, pcb: Pcb) {
        self.procs.push(pcb);
    }

    pub fn get(&self, pid: Word) -> Option<&Pcb> {
        self.procs.iter().find(|p| p.pid() == pid)
    }

    pub fn get_mut(&mut self, pid: Word) -> Option<&mut Pcb> {
        self.procs.iter_mut().find(|p| p.pid() == pid)
    }

    /// Remove a process. Clears `current` if it pointed at the removed
    /// pid; the scheduler picks a successor afterwards.
    pub fn remove(&mut self, pid: Word) -> Option<Pcb> {
        let idx = self.procs.iter().position(|p| p.pid() == pid)?;
        if self.current == Some(pid) {
            self.current = None;
        }
        Some(self.procs.remove(idx))
    }

    pub fn current_pid(&self) -> Option<Word> {
        self.current
    }

    pub fn set_current(&mut self, pid: Option<Word>) {
        self.current = pid;
    }

    pub fn current(&self) -> Option<&Pcb> {
        self.current.and_then(|pid| self.get(pid))
    }

    pub fn current_mut(&mut self) -> Option<&mut Pcb> {
        let pid = self.current?;
        self.get_mut(pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> + Clone {
        self.procs.iter()
    }

    /// First process (in table order) blocked on the given completion
    /// tuple, or `None`.
    pub fn select_blocked(&self, dev: Word, op: IoOp, addr: Word) -> Option<Word> {
        self.procs
            .iter()
            .find(|p| p.is_blocked_for(dev, op, addr))
            .map(|p| p.pid())
    }

    /// Fleet average of per-process average starve times, counting only
    /// processes that have starved at all.
    pub fn overall_avg_starve(&self) -> f64 {
        let starves: Vec<f64> = self
            .procs
            .iter()
            .map(|p| p.avg_starve())
            .filter(|s| *s > 0.0)
            .collect();
        if starves.is_empty() {
            0.0
        } else {
            starves.iter().sum::<f64>() / starves.len() as f64
        }
    }

    pub fn overall_avg_run_time(&self) -> u64 {
        if self.procs.is_empty() {
            return 0;
        }
        self.procs.iter().map(|p| p.avg_run_time()).sum::<u64>() / self.procs.len() as u64
    }

    pub fn avg_last_ready_time(&self) -> u64 {
        if self.procs.is_empty() {
            return 0;
        }
        self.procs.iter().map(|p| p.last_ready_time()).sum::<u64>() / self.procs.len() as u64
    }

    /// Multi-line dump for the kernel debug log.
    pub fn dump(&self) -> String {
        let mut out = format!("process table ({} processes)\n", self.procs.len());
        for p in &self.procs {
            let state = if self.current == Some(p.pid()) {
                "RUNNING "
            } else {
                ""
            };
            out.push_str(&format!("    {}{}\n", state, p));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm::InterruptController;

    fn cpu() -> Cpu {
        Cpu::new(InterruptController::shared())
    }

    #[test]
    fn save_and_restore_round_trip_the_registers() {
        let mut cpu = cpu();
        cpu.regs = [1, 2, 3, 4, 5, 100, 120, 100, 64];
        let mut pcb = Pcb::new(1001, &cpu);
        pcb.save(&mut cpu);

        cpu.regs = [0; NUM_REGS];
        pcb.restore(&mut cpu);
        assert_eq!(cpu.regs, [1, 2, 3, 4, 5, 100, 120, 100, 64]);
    }

    #[test]
    fn save_and_restore_each_charge_thirty_ticks() {
        let mut cpu = cpu();
        let mut pcb = Pcb::new(1001, &cpu);
        pcb.save(&mut cpu);
        assert_eq!(cpu.ticks(), SAVE_LOAD_TIME);
        pcb.restore(&mut cpu);
        assert_eq!(cpu.ticks(), 2 * SAVE_LOAD_TIME);
    }

    #[test]
    fn starve_statistics_track_ready_waits() {
        let mut cpu = cpu();
        let mut pcb = Pcb::new(1001, &cpu);
        pcb.save(&mut cpu); // ready at tick 30
        cpu.add_ticks(70); // waits 70 ticks
        pcb.restore(&mut cpu); // restore charges 30 more
        assert_eq!(pcb.max_starve(), 100);
        assert!((pcb.avg_starve() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn blocked_matching_ignores_address_for_open() {
        let mut cpu = cpu();
        let mut pcb = Pcb::new(1001, &cpu);
        pcb.block(&mut cpu, 1, IoOp::Open, 0);
        assert!(pcb.is_blocked_for(1, IoOp::Open, 999));
        assert!(!pcb.is_blocked_for(2, IoOp::Open, 0));
        assert!(!pcb.is_blocked_for(1, IoOp::Read, 0));
    }

    #[test]
    fn blocked_matching_requires_address_for_read() {
        let mut cpu = cpu();
        let mut pcb = Pcb::new(1001, &cpu);
        pcb.block(&mut cpu, 1, IoOp::Read, 17);
        assert!(pcb.is_blocked_for(1, IoOp::Read, 17));
        assert!(!pcb.is_blocked_for(1, IoOp::Read, 18));
    }

    #[test]
    fn move_preserves_contents_and_slides_pointers() {
        let mut cpu = cpu();
        let mut ram = Ram::new(500);
        ram.load(200, &[9, 8, 7, 6]);
        cpu.set_base(200);
        cpu.set_lim(4);
        cpu.set_pc(200);
        cpu.set_sp(203);
        let mut pcb = Pcb::new(1001, &cpu);

        pcb.move_to(40, &mut ram, Some(&mut cpu));

        assert_eq!(
            (0..4).map(|i| ram.read(40 + i)).collect::<Vec<_>>(),
            vec![9, 8, 7, 6]
        );
        assert_eq!(pcb.base(), 40);
        assert_eq!(pcb.lim(), 4);
        assert_eq!(pcb.register(Register::Pc), 40);
        assert_eq!(pcb.sp(), 43);
        assert_eq!(cpu.base(), 40);
        assert_eq!(cpu.pc(), 40);
        assert_eq!(cpu.sp(), 43);
    }

    #[test]
    fn select_blocked_scans_in_table_order() {
        let cpu0 = cpu();
        let mut table = ProcessTable::new();
        let mut a = Pcb::new(1001, &cpu0);
        let mut b = Pcb::new(1002, &cpu0);
        let mut c = cpu();
        a.block(&mut c, 1, IoOp::Open, 0);
        b.block(&mut c, 1, IoOp::Open, 0);
        table.push(a);
        table.push(b);
        assert_eq!(table.select_blocked(1, IoOp::Open, 0), Some(1001));
    }
}
