#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use os::{Computer, SimDevice};
use program::{Program, ProgramBuilder};
use types::Word;
use vm::Control;

pub const RAM_SIZE: Word = 3000;

/// The standard device fixture: id 1 is console-like (non-sharable,
/// read/write), id 2 is a sharable read-only sensor, id 5 is never
/// registered.
pub struct Fixture {
    pub computer: Computer,
    pub console_available: Rc<Cell<bool>>,
    pub console_store: Rc<RefCell<HashMap<Word, Word>>>,
}

pub fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut computer = Computer::with_seed(RAM_SIZE, 0xC0FFEE);

    let console = SimDevice::new(computer.interrupts());
    let console_available = console.availability();
    let console_store = console.store();
    computer.register_device(Box::new(console), 1);

    let sensor = SimDevice::new(computer.interrupts())
        .sharable(true)
        .writeable(false);
    computer.register_device(Box::new(sensor), 2);

    Fixture {
        computer,
        console_available,
        console_store,
    }
}

/// Append `TRAP` with syscall number `n`, clobbering r0.
pub fn syscall(b: ProgramBuilder, n: Word) -> ProgramBuilder {
    b.set(0, n).push(0).trap()
}

/// Endless YIELD loop. The first instruction is duplicated: a process
/// that is saved before it ever runs resumes one instruction past its
/// entry point, the same wrinkle the kernel's idle stub covers for.
pub static SPIN: Lazy<Program> = Lazy::new(|| {
    ProgramBuilder::new()
        .set(4, 0)
        .set(4, 0)
        .set(0, 8)
        .push(0)
        .trap()
        .branch(8)
        .build("spin")
});

/// Step the machine until `pred` holds, giving up after `max` cycles or
/// when the kernel halts.
pub fn step_until(computer: &mut Computer, max: usize, pred: impl Fn(&Computer) -> bool) -> bool {
    for _ in 0..max {
        if pred(computer) {
            return true;
        }
        if let Control::Exit(_) = computer.step() {
            break;
        }
    }
    pred(computer)
}

/// The §-style machine invariants, checked at instruction boundaries:
/// process windows in range and disjoint, free blocks tiling the rest of
/// RAM without touching, opener sets referencing live processes only,
/// non-sharable devices single-held, and exactly one current process
/// unless the table is empty.
pub fn assert_invariants(computer: &Computer) {
    let sos = computer.sos();
    let ram_size = computer.ram().size();
    let table = sos.process_table();

    let mut regions: Vec<(Word, Word)> = Vec::new();
    for p in table.iter() {
        assert!(p.base() >= 0, "process {} base negative", p.pid());
        assert!(p.lim() > 0, "process {} empty window", p.pid());
        assert!(
            p.base() + p.lim() <= ram_size,
            "process {} window past end of RAM",
            p.pid()
        );
        regions.push((p.base(), p.lim()));
    }

    let free = sos.free_list().blocks();
    for w in free.windows(2) {
        assert!(
            w[0].addr + w[0].size < w[1].addr,
            "adjacent free blocks at {} and {}",
            w[0].addr,
            w[1].addr
        );
    }
    for b in free {
        regions.push((b.addr, b.size));
    }

    regions.sort();
    let mut cursor = 0;
    for (addr, size) in regions {
        assert_eq!(addr, cursor, "allocation map has a gap or overlap at {}", addr);
        cursor += size;
    }
    assert_eq!(cursor, ram_size, "allocation map does not cover RAM");

    for dev in sos.device_registry().iter() {
        for pid in dev.openers() {
            assert!(
                table.get(*pid).is_some(),
                "device {} opener {} is not a live process",
                dev.id(),
                pid
            );
        }
        if !dev.driver.is_sharable() {
            assert!(
                dev.openers().len() <= 1,
                "non-sharable device {} has {} openers",
                dev.id(),
                dev.openers().len()
            );
        }
    }

    if !table.is_empty() {
        assert!(table.current_pid().is_some(), "live table with no current process");
    }
}
