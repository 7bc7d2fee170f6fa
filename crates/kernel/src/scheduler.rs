use log::debug;
use rand::Rng;
use types::{Word, ERROR_NO_PROCESSES};
use vm::{Control, Cpu, Ram};

use crate::Sos;

/// How the scheduler picks among READY processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Starvation-aware selection with a context-switch bias toward the
    /// incumbent.
    #[default]
    Starvation,
    /// Random rotation scan for the first non-blocked process.
    Random,
}

/// Synthetic starvation credited to the running process so a switch has
/// to be worth two register transfers.
const CONTEXT_SWITCH_BIAS: f64 = 100.0;

impl Sos {
    /// Pick and install the next process to run. Called on EXIT, YIELD,
    /// block, clock interrupt and load completion.
    ///
    /// An empty table ends the simulation. No READY process but some
    /// BLOCKED ones means the idle stub gets injected instead.
    pub(crate) fn schedule(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        if self.table.is_empty() {
            debug!("scheduling with an empty process table; halting");
            return Control::Exit(ERROR_NO_PROCESSES);
        }

        let next = match self.policy {
            SchedPolicy::Starvation => self.select_starvation_aware(),
            SchedPolicy::Random => self.select_random(),
        };
        let Some(next) = next else {
            self.create_idle_process(cpu, ram);
            return Control::Continue;
        };

        if self.table.current_pid() != Some(next) {
            // A process that blocked already saved itself; anything else
            // leaving the CPU gets saved here.
            if let Some(pcb) = self.table.current_mut() {
                if !pcb.is_blocked() {
                    pcb.save(cpu);
                }
            }
            self.table.set_current(Some(next));
            self.table
                .get_mut(next)
                .expect("scheduled pid vanished from the table")
                .restore(cpu);
            debug!("switched to process {}", next);
        }
        Control::Continue
    }

    /// The starvation-aware preference order over READY processes:
    /// the incumbent starts as best with a +100 bias; a candidate wins
    /// when its average starve dominates both the fleet average and the
    /// best so far, or when it entered the ready queue later than the
    /// fleet on average; failing that, a candidate with at least the
    /// fleet's average run time wins if it out-starves the best.
    fn select_starvation_aware(&self) -> Option<Word> {
        let fleet_avg_run = self.table.overall_avg_run_time();
        let fleet_avg_ready = self.table.avg_last_ready_time();
        let mut fleet_avg_starve = 0.0;

        let mut best: Option<Word> = None;
        let mut best_starve = -1.0f64;
        if let Some(cur) = self.table.current() {
            if !cur.is_blocked() {
                best = Some(cur.pid());
                best_starve = cur.avg_starve() + CONTEXT_SWITCH_BIAS;
                fleet_avg_starve = self.table.overall_avg_starve();
            }
        }

        let incumbent = best;
        for p in self.table.iter() {
            if p.is_blocked() || Some(p.pid()) == incumbent {
                continue;
            }
            if (p.avg_starve() >= best_starve && p.avg_starve() >= fleet_avg_starve)
                || p.last_ready_time() >= fleet_avg_ready
            {
                best_starve = p.avg_starve();
                best = Some(p.pid());
            } else if p.avg_run_time() >= fleet_avg_run && p.avg_starve() > best_starve {
                best_starve = p.avg_starve();
                best = Some(p.pid());
            }
        }
        best
    }

    /// Rotation scan from a random offset; first non-blocked process
    /// wins.
    fn select_random(&mut self) -> Option<Word> {
        let n = self.table.len();
        if n == 0 {
            return None;
        }
        let offset = self.rng.gen_range(0..n);
        self.table
            .iter()
            .cycle()
            .skip(offset)
            .take(n)
            .find(|p| !p.is_blocked())
            .map(|p| p.pid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::IDLE_PID;
    use crate::pcb::IoOp;
    use program::{Program, ProgramBuilder};
    use vm::{Cpu, InterruptController, Ram};

    fn machine() -> (Cpu, Ram) {
        (Cpu::new(InterruptController::shared()), Ram::new(1000))
    }

    fn spin() -> Program {
        // push YIELD, trap, loop
        ProgramBuilder::new()
            .set(0, 8)
            .push(0)
            .trap()
            .branch(0)
            .build("spin")
    }

    #[test]
    fn empty_table_ends_the_simulation() {
        let (mut cpu, mut ram) = machine();
        let mut sos = Sos::with_seed(1000, 7);
        assert_eq!(
            sos.schedule(&mut cpu, &mut ram),
            Control::Exit(ERROR_NO_PROCESSES)
        );
    }

    #[test]
    fn lone_ready_process_keeps_the_cpu() {
        let (mut cpu, mut ram) = machine();
        let mut sos = Sos::with_seed(1000, 7);
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        let ticks = cpu.ticks();

        assert_eq!(sos.schedule(&mut cpu, &mut ram), Control::Continue);

        assert_eq!(sos.table.current_pid(), Some(1001));
        // No switch means no save/restore penalty.
        assert_eq!(cpu.ticks(), ticks);
    }

    #[test]
    fn all_blocked_injects_the_idle_process() {
        let (mut cpu, mut ram) = machine();
        let mut sos = Sos::with_seed(1000, 7);
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        sos.table
            .current_mut()
            .unwrap()
            .block(&mut cpu, 1, IoOp::Read, 0);

        assert_eq!(sos.schedule(&mut cpu, &mut ram), Control::Continue);

        assert_eq!(sos.table.current_pid(), Some(IDLE_PID));
        assert_eq!(sos.table.len(), 2);
        assert_eq!(cpu.lim(), 16);
    }

    #[test]
    fn waiting_process_preempts_a_fresh_incumbent() {
        let (mut cpu, mut ram) = machine();
        let mut sos = Sos::with_seed(1000, 7);
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        assert_eq!(sos.table.current_pid(), Some(1002));

        // 1001 entered the ready queue when 1002 was loaded, which is at
        // least the fleet-average last-ready time.
        assert_eq!(sos.schedule(&mut cpu, &mut ram), Control::Continue);
        assert_eq!(sos.table.current_pid(), Some(1001));
    }

    #[test]
    fn random_policy_skips_blocked_processes() {
        let (mut cpu, mut ram) = machine();
        let mut sos = Sos::with_seed(1000, 42);
        sos.set_policy(SchedPolicy::Random);
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        assert!(sos.load_program(&spin(), &mut cpu, &mut ram));
        sos.table
            .current_mut()
            .unwrap()
            .block(&mut cpu, 1, IoOp::Write, 3);

        assert_eq!(sos.schedule(&mut cpu, &mut ram), Control::Continue);
        assert_eq!(sos.table.current_pid(), Some(1001));
    }
}
