use log::debug;
use types::Word;
use vm::{Cpu, Ram};

use crate::Sos;

/// One free region of RAM: `[addr, addr + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemBlock {
    pub addr: Word,
    pub size: Word,
}

/// The set of free RAM regions, kept disjoint and non-adjacent.
///
/// Invariants after every operation:
/// - every block satisfies `addr >= 0` and `addr + size <= ram_size`;
/// - no two blocks overlap or touch (coalescing merges neighbors);
/// - the union of free blocks and allocated process windows covers RAM.
#[derive(Debug)]
pub struct FreeList {
    blocks: Vec<MemBlock>,
    ram_size: Word,
}

impl FreeList {
    pub fn new(ram_size: Word) -> Self {
        Self {
            blocks: vec![MemBlock {
                addr: 0,
                size: ram_size,
            }],
            ram_size,
        }
    }

    pub fn blocks(&self) -> &[MemBlock] {
        &self.blocks
    }

    pub fn total_free(&self) -> Word {
        self.blocks.iter().map(|b| b.size).sum()
    }

    /// Best-fit carve: among blocks strictly larger than `size`, take the
    /// smallest (lowest address on ties) and leave the residual at
    /// `addr + size`, flush against the allocation.
    pub fn best_fit(&mut self, size: Word) -> Option<Word> {
        let mut best: Option<usize> = None;
        for (i, b) in self.blocks.iter().enumerate() {
            if b.size <= size {
                continue;
            }
            let better = match best {
                None => true,
                Some(j) => {
                    let c = self.blocks[j];
                    b.size < c.size || (b.size == c.size && b.addr < c.addr)
                }
            };
            if better {
                best = Some(i);
            }
        }
        let i = best?;
        let addr = self.blocks[i].addr;
        self.blocks[i].addr = addr + size;
        self.blocks[i].size -= size;
        Some(addr)
    }

    /// Return `[addr, addr + size)` to the free set and merge with any
    /// adjacent free neighbor on either side.
    pub fn free(&mut self, addr: Word, size: Word) {
        self.blocks.push(MemBlock { addr, size });
        self.normalize();
    }

    /// Collapse the free set to the single tail block `[addr, ram_size)`;
    /// used after compaction has slid every process downward.
    pub fn reset_to(&mut self, addr: Word) {
        self.blocks.clear();
        if addr < self.ram_size {
            self.blocks.push(MemBlock {
                addr,
                size: self.ram_size - addr,
            });
        }
    }

    fn normalize(&mut self) {
        self.blocks.sort_by_key(|b| b.addr);
        let mut merged: Vec<MemBlock> = Vec::with_capacity(self.blocks.len());
        for b in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.addr + prev.size == b.addr => prev.size += b.size,
                _ => merged.push(b),
            }
        }
        self.blocks = merged;
    }
}

impl Sos {
    /// Find a home for `size` words. Best-fit first; if no single block
    /// is large enough but the free space in total is, compact RAM and
    /// carve from the tail. `None` means the request exceeds total free
    /// space and the caller decides (loader skip or syscall failure).
    pub(crate) fn alloc_block(&mut self, size: Word, cpu: &mut Cpu, ram: &mut Ram) -> Option<Word> {
        if let Some(addr) = self.free_list.best_fit(size) {
            return Some(addr);
        }
        if self.free_list.total_free() >= size {
            let next_base = self.compact(cpu, ram);
            self.free_list.reset_to(next_base + size);
            return Some(next_base);
        }
        None
    }

    /// Slide every process down so the allocated windows occupy
    /// `[0, total_allocated)` in ascending BASE order. Returns the first
    /// free address. Callers must have saved the running process first so
    /// every PCB's snapshot is authoritative.
    pub(crate) fn compact(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Word {
        let mut order: Vec<Word> = self.table.iter().map(|p| p.pid()).collect();
        order.sort_by_key(|pid| self.table.get(*pid).map(|p| p.base()).unwrap_or(Word::MAX));

        let mut next_base = 0;
        for pid in order {
            let is_current = self.table.current_pid() == Some(pid);
            let pcb = match self.table.get_mut(pid) {
                Some(p) => p,
                None => continue,
            };
            if pcb.base() != next_base {
                let old = pcb.base();
                pcb.move_to(next_base, ram, if is_current { Some(cpu) } else { None });
                debug!("process {} moved from {} to {}", pid, old, next_base);
            }
            next_base += pcb.lim();
        }
        next_base
    }

    /// Render the allocation map (processes and free blocks interleaved
    /// by address) for the kernel debug log.
    pub fn dump_memory_map(&self) -> String {
        let mut rows: Vec<(Word, String)> = Vec::new();
        for p in self.table.iter() {
            rows.push((
                p.base(),
                format!(
                    "process {} (addr={} size={} words) SP={}",
                    p.pid(),
                    p.base(),
                    p.lim(),
                    p.sp()
                ),
            ));
        }
        for b in self.free_list.blocks() {
            rows.push((b.addr, format!("open (addr={} size={})", b.addr, b.size)));
        }
        rows.sort_by_key(|(addr, _)| *addr);

        let mut out = String::from("memory allocation table\n");
        for (_, row) in rows {
            out.push_str("    ");
            out.push_str(&row);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_restores_the_initial_block() {
        let mut fl = FreeList::new(3000);
        let addr = fl.best_fit(500).unwrap();
        assert_eq!(addr, 0);
        fl.free(addr, 500);
        assert_eq!(fl.blocks(), &[MemBlock { addr: 0, size: 3000 }]);
    }

    #[test]
    fn residual_is_flush_against_the_allocation() {
        let mut fl = FreeList::new(1000);
        let addr = fl.best_fit(100).unwrap();
        assert_eq!(addr, 0);
        assert_eq!(fl.blocks(), &[MemBlock { addr: 100, size: 900 }]);
    }

    #[test]
    fn best_fit_prefers_the_smallest_block() {
        let mut fl = FreeList::new(3000);
        fl.reset_to(3000);
        fl.free(0, 400);
        fl.free(1000, 150);
        fl.free(2000, 600);
        // 150 is the tightest block strictly larger than 100.
        assert_eq!(fl.best_fit(100), Some(1000));
    }

    #[test]
    fn best_fit_breaks_size_ties_by_lowest_address() {
        let mut fl = FreeList::new(3000);
        fl.reset_to(3000);
        fl.free(1200, 200);
        fl.free(300, 200);
        assert_eq!(fl.best_fit(100), Some(300));
    }

    #[test]
    fn exact_size_block_is_not_best_fit() {
        let mut fl = FreeList::new(1000);
        fl.reset_to(1000);
        fl.free(0, 200);
        assert_eq!(fl.best_fit(200), None);
    }

    #[test]
    fn free_coalesces_both_sides() {
        let mut fl = FreeList::new(900);
        fl.reset_to(900);
        fl.free(0, 300);
        fl.free(600, 300);
        assert_eq!(fl.blocks().len(), 2);
        fl.free(300, 300);
        assert_eq!(fl.blocks(), &[MemBlock { addr: 0, size: 900 }]);
    }

    #[test]
    fn total_free_sums_every_block() {
        let mut fl = FreeList::new(1000);
        fl.best_fit(100).unwrap();
        fl.best_fit(200).unwrap();
        assert_eq!(fl.total_free(), 700);
    }

    fn spin(alloc: Word) -> program::Program {
        program::ProgramBuilder::new()
            .set(4, 0)
            .set(4, 0)
            .set(0, 8)
            .push(0)
            .trap()
            .branch(8)
            .build("spin")
            .with_alloc_size(alloc)
    }

    #[test]
    fn compaction_relocates_processes_and_carves_the_tail() {
        let mut cpu = Cpu::new(vm::InterruptController::shared());
        let mut ram = Ram::new(3000);
        let mut sos = crate::Sos::with_seed(3000, 9);

        assert!(sos.load_program(&spin(700), &mut cpu, &mut ram)); // 1001 @ 0
        assert!(sos.load_program(&spin(500), &mut cpu, &mut ram)); // 1002 @ 700
        assert!(sos.load_program(&spin(700), &mut cpu, &mut ram)); // 1003 @ 1200
        assert!(sos.load_program(&spin(500), &mut cpu, &mut ram)); // 1004 @ 1900

        // Kill 1002: a 500-word hole at 700 plus the 600-word tail. No
        // single block fits 800 words but the total free space does.
        sos.table.set_current(Some(1002));
        sos.syscall_exit(&mut cpu, &mut ram);
        assert!(sos.free_list.blocks().iter().all(|b| b.size < 800));
        assert!(sos.free_list.total_free() >= 800);

        let big = spin(800);
        assert!(sos.load_program(&big, &mut cpu, &mut ram)); // 1005

        // Survivors slid down in BASE order; the new process landed
        // right after them and the tail is the only free block.
        let base_of = |pid: Word| sos.table.get(pid).unwrap().base();
        assert_eq!(base_of(1001), 0);
        assert_eq!(base_of(1003), 700);
        assert_eq!(base_of(1004), 1400);
        assert_eq!(base_of(1005), 1900);
        assert_eq!(
            sos.free_list.blocks(),
            &[MemBlock {
                addr: 2700,
                size: 300
            }]
        );

        // Relocation preserved the images.
        for (i, w) in big.words().iter().enumerate() {
            assert_eq!(ram.read(700 + i as Word), *w); // 1003, moved down
            assert_eq!(ram.read(1900 + i as Word), *w); // 1005, freshly loaded
        }
    }
}
