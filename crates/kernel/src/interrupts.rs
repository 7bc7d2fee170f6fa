use log::{error, warn};
use types::{Word, ERROR_DEVICE_EXISTENCE, SUCCESS};
use vm::{Control, Cpu, Ram, Register};

use crate::pcb::IoOp;
use crate::Sos;

impl Sos {
    /// Fatal per-process fault: the offending process exits and a
    /// successor is scheduled.
    pub(crate) fn interrupt_illegal_memory_access(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        addr: Word,
    ) -> Control {
        error!(
            "illegal memory access at address {} by process {:?}",
            addr,
            self.table.current_pid()
        );
        self.syscall_exit(cpu, ram)
    }

    pub(crate) fn interrupt_divide_by_zero(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        error!(
            "divide by zero in process {:?}",
            self.table.current_pid()
        );
        self.syscall_exit(cpu, ram)
    }

    pub(crate) fn interrupt_illegal_instruction(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        instr: [Word; 4],
    ) -> Control {
        error!(
            "illegal instruction {:?} in process {:?}",
            instr,
            self.table.current_pid()
        );
        self.syscall_exit(cpu, ram)
    }

    /// Preemption point: fires on every clock-frequency boundary.
    pub(crate) fn interrupt_clock(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        self.schedule(cpu, ram)
    }

    /// A device finished a read. The unique process blocked on
    /// (device, READ, addr) gets the data and a success word written
    /// into its saved stack, then becomes READY; it pops SUCCESS first,
    /// then the data.
    pub(crate) fn interrupt_io_read_complete(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        dev: Word,
        addr: Word,
        data: Word,
    ) -> Control {
        if self.devices.find(dev).is_none() {
            cpu.push(ram, ERROR_DEVICE_EXISTENCE);
            return Control::Continue;
        }
        let Some(pid) = self.table.select_blocked(dev, IoOp::Read, addr) else {
            warn!("read completion on device {} @{} with no waiter", dev, addr);
            return Control::Continue;
        };
        let now = cpu.ticks();
        let pcb = self
            .table
            .get_mut(pid)
            .expect("blocked pid vanished from the table");
        pcb.unblock(now);
        let mut sp = pcb.sp();
        sp += 1;
        ram.write(sp, data);
        sp += 1;
        ram.write(sp, SUCCESS);
        pcb.set_register(Register::Sp, sp);
        Control::Continue
    }

    /// A device finished a write; the waiter gets one success word.
    pub(crate) fn interrupt_io_write_complete(
        &mut self,
        cpu: &mut Cpu,
        ram: &mut Ram,
        dev: Word,
        addr: Word,
    ) -> Control {
        if self.devices.find(dev).is_none() {
            cpu.push(ram, ERROR_DEVICE_EXISTENCE);
            return Control::Continue;
        }
        let Some(pid) = self.table.select_blocked(dev, IoOp::Write, addr) else {
            warn!(
                "write completion on device {} @{} with no waiter",
                dev, addr
            );
            return Control::Continue;
        };
        let now = cpu.ticks();
        let pcb = self
            .table
            .get_mut(pid)
            .expect("blocked pid vanished from the table");
        pcb.unblock(now);
        let sp = pcb.sp() + 1;
        ram.write(sp, SUCCESS);
        pcb.set_register(Register::Sp, sp);
        Control::Continue
    }
}
