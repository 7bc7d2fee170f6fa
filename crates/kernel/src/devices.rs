use std::fmt;

use types::Word;

/// Capability interface a device driver exposes to the kernel. Drivers
/// are opaque: completion is reported asynchronously through the
/// interrupt controller, never through these calls.
pub trait Device: fmt::Debug {
    /// Registration hands the driver its id; drivers tag completion
    /// events with it.
    fn set_id(&mut self, id: Word);

    /// May more than one process hold this device open at once?
    fn is_sharable(&self) -> bool;

    /// Can the device accept a read/write right now? When false, the
    /// dispatcher re-queues the syscall for a later retry.
    fn is_available(&self) -> bool;

    fn is_readable(&self) -> bool;

    fn is_writeable(&self) -> bool;

    /// Start a read of `addr`; the driver posts `ReadDone` when finished.
    fn read(&mut self, addr: Word);

    /// Start a write of `data` to `addr`; the driver posts `WriteDone`.
    fn write(&mut self, addr: Word, data: Word);
}

/// A registered device: driver plus the set of processes holding it
/// open. Openers are pids, resolved through the process table on use, so
/// a dead process can be swept out without dangling references.
#[derive(Debug)]
pub struct DeviceInfo {
    id: Word,
    pub driver: Box<dyn Device>,
    openers: Vec<Word>,
}

impl DeviceInfo {
    pub fn id(&self) -> Word {
        self.id
    }

    pub fn openers(&self) -> &[Word] {
        &self.openers
    }

    pub fn is_opened_by(&self, pid: Word) -> bool {
        self.openers.contains(&pid)
    }

    pub fn add_opener(&mut self, pid: Word) {
        self.openers.push(pid);
    }

    pub fn remove_opener(&mut self, pid: Word) {
        self.openers.retain(|p| *p != pid);
    }

    pub fn unused(&self) -> bool {
        self.openers.is_empty()
    }
}

/// All devices installed on the machine, looked up by id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a driver under `id`. Ids must be unique; installing a
    /// duplicate is a harness bug.
    pub fn register(&mut self, mut driver: Box<dyn Device>, id: Word) {
        assert!(
            self.find(id).is_none(),
            "device id {} registered twice",
            id
        );
        driver.set_id(id);
        self.devices.push(DeviceInfo {
            id,
            driver,
            openers: Vec::new(),
        });
    }

    pub fn find(&self, id: Word) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn find_mut(&mut self, id: Word) -> Option<&mut DeviceInfo> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    pub fn is_sharable(&self, id: Word) -> bool {
        self.find(id).is_some_and(|d| d.driver.is_sharable())
    }

    pub fn is_available(&self, id: Word) -> bool {
        self.find(id).is_some_and(|d| d.driver.is_available())
    }

    pub fn is_readable(&self, id: Word) -> bool {
        self.find(id).is_some_and(|d| d.driver.is_readable())
    }

    pub fn is_writeable(&self, id: Word) -> bool {
        self.find(id).is_some_and(|d| d.driver.is_writeable())
    }

    /// Remove a dead process from every opener set.
    pub fn sweep(&mut self, pid: Word) {
        for dev in &mut self.devices {
            dev.remove_opener(pid);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Null;

    impl Device for Null {
        fn set_id(&mut self, _id: Word) {}
        fn is_sharable(&self) -> bool {
            true
        }
        fn is_available(&self) -> bool {
            true
        }
        fn is_readable(&self) -> bool {
            true
        }
        fn is_writeable(&self) -> bool {
            true
        }
        fn read(&mut self, _addr: Word) {}
        fn write(&mut self, _addr: Word, _data: Word) {}
    }

    #[test]
    fn openers_are_tracked_per_device() {
        let mut reg = DeviceRegistry::new();
        reg.register(Box::new(Null), 1);
        reg.register(Box::new(Null), 2);

        reg.find_mut(1).unwrap().add_opener(1001);
        assert!(reg.find(1).unwrap().is_opened_by(1001));
        assert!(!reg.find(2).unwrap().is_opened_by(1001));
    }

    #[test]
    fn sweep_clears_a_pid_from_every_opener_set() {
        let mut reg = DeviceRegistry::new();
        reg.register(Box::new(Null), 1);
        reg.register(Box::new(Null), 2);
        reg.find_mut(1).unwrap().add_opener(1001);
        reg.find_mut(2).unwrap().add_opener(1001);
        reg.find_mut(2).unwrap().add_opener(1002);

        reg.sweep(1001);

        assert!(reg.find(1).unwrap().unused());
        assert_eq!(reg.find(2).unwrap().openers(), &[1002]);
    }

    #[test]
    #[should_panic]
    fn duplicate_ids_are_rejected() {
        let mut reg = DeviceRegistry::new();
        reg.register(Box::new(Null), 7);
        reg.register(Box::new(Null), 7);
    }
}
