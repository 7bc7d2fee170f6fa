use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use kernel::Device;
use types::Word;
use vm::{Interrupt, SharedInterrupts};

/// A simulated device backed by a word-addressed store. Reads and writes
/// complete by posting to the interrupt controller, which the CPU polls
/// at the next instruction boundary; that is the shortest asynchronous
/// completion the machine can express.
///
/// The availability flag and the backing store are shared handles so a
/// harness can flip a device busy (exercising the dispatcher's retry
/// path) or inspect what was written, after the driver has been boxed
/// into the registry.
#[derive(Debug)]
pub struct SimDevice {
    id: Word,
    sharable: bool,
    readable: bool,
    writeable: bool,
    available: Rc<Cell<bool>>,
    store: Rc<RefCell<HashMap<Word, Word>>>,
    interrupts: SharedInterrupts,
}

impl SimDevice {
    /// A non-sharable read/write device that is always available.
    pub fn new(interrupts: SharedInterrupts) -> Self {
        Self {
            id: 0,
            sharable: false,
            readable: true,
            writeable: true,
            available: Rc::new(Cell::new(true)),
            store: Rc::new(RefCell::new(HashMap::new())),
            interrupts,
        }
    }

    pub fn sharable(mut self, yes: bool) -> Self {
        self.sharable = yes;
        self
    }

    pub fn readable(mut self, yes: bool) -> Self {
        self.readable = yes;
        self
    }

    pub fn writeable(mut self, yes: bool) -> Self {
        self.writeable = yes;
        self
    }

    /// Shared availability toggle; flip to false to make the dispatcher
    /// re-queue READ/WRITE syscalls.
    pub fn availability(&self) -> Rc<Cell<bool>> {
        self.available.clone()
    }

    /// Shared backing store handle.
    pub fn store(&self) -> Rc<RefCell<HashMap<Word, Word>>> {
        self.store.clone()
    }
}

impl Device for SimDevice {
    fn set_id(&mut self, id: Word) {
        self.id = id;
    }

    fn is_sharable(&self) -> bool {
        self.sharable
    }

    fn is_available(&self) -> bool {
        self.available.get()
    }

    fn is_readable(&self) -> bool {
        self.readable
    }

    fn is_writeable(&self) -> bool {
        self.writeable
    }

    fn read(&mut self, addr: Word) {
        let data = self.store.borrow().get(&addr).copied().unwrap_or(0);
        self.interrupts.borrow_mut().post(Interrupt::ReadDone {
            dev: self.id,
            addr,
            data,
        });
    }

    fn write(&mut self, addr: Word, data: Word) {
        self.store.borrow_mut().insert(addr, data);
        self.interrupts
            .borrow_mut()
            .post(Interrupt::WriteDone { dev: self.id, addr });
    }
}
