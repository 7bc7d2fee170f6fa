use log::{debug, error, warn};
use rand::Rng;
use types::{
    Word, ERROR_DEVICE_EXISTENCE, ERROR_DEVICE_NOT_OPEN, ERROR_DEVICE_NOT_READABLE,
    ERROR_DEVICE_NOT_WRITEABLE, ERROR_DEVICE_OPEN, ERROR_NEED_MORE_SPACE, INSTR_SIZE, SUCCESS,
};
use vm::{Control, Cpu, Ram};

use crate::pcb::IoOp;
use crate::Sos;

// Syscall opcodes as user code pushes them before TRAP.
pub const SYSCALL_EXIT: Word = 0;
pub const SYSCALL_OUTPUT: Word = 1;
pub const SYSCALL_GETPID: Word = 2;
pub const SYSCALL_OPEN: Word = 3;
pub const SYSCALL_CLOSE: Word = 4;
pub const SYSCALL_READ: Word = 5;
pub const SYSCALL_WRITE: Word = 6;
pub const SYSCALL_EXEC: Word = 7;
pub const SYSCALL_YIELD: Word = 8;
pub const SYSCALL_COREDUMP: Word = 9;

impl Sos {
    /// TRAP entry point: pop the syscall opcode off the caller's stack
    /// and dispatch. Arguments were pushed by user code in the
    /// documented order; each handler leaves its result word on the
    /// stack, except the blocking paths which defer that to the
    /// completion interrupt.
    pub(crate) fn dispatch_syscall(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        let opcode = cpu.pop(ram);
        debug!("syscall {} from process {:?}", opcode, self.table.current_pid());
        match opcode {
            SYSCALL_EXIT => self.syscall_exit(cpu, ram),
            SYSCALL_OUTPUT => {
                self.syscall_output(cpu, ram);
                Control::Continue
            }
            SYSCALL_GETPID => {
                self.syscall_getpid(cpu, ram);
                Control::Continue
            }
            SYSCALL_OPEN => self.syscall_open(cpu, ram),
            SYSCALL_CLOSE => {
                self.syscall_close(cpu, ram);
                Control::Continue
            }
            SYSCALL_READ => self.syscall_read(cpu, ram),
            SYSCALL_WRITE => self.syscall_write(cpu, ram),
            SYSCALL_EXEC => self.syscall_exec(cpu, ram),
            SYSCALL_YIELD => self.schedule(cpu, ram),
            SYSCALL_COREDUMP => self.syscall_coredump(cpu, ram),
            other => {
                warn!("unknown syscall opcode {}; ignored", other);
                Control::Continue
            }
        }
    }

    pub(crate) fn syscall_exit(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        self.remove_current_process();
        self.schedule(cpu, ram)
    }

    fn syscall_output(&mut self, cpu: &mut Cpu, ram: &mut Ram) {
        let value = cpu.pop(ram);
        println!("\nOUTPUT: {}", value);
        self.console.push(value);
    }

    fn syscall_getpid(&mut self, cpu: &mut Cpu, ram: &mut Ram) {
        let pid = self
            .table
            .current_pid()
            .expect("syscall with no current process");
        cpu.push(ram, pid);
    }

    fn syscall_open(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        let dev_id = cpu.pop(ram);
        let pid = self
            .table
            .current_pid()
            .expect("syscall with no current process");

        let granted = match self.devices.find_mut(dev_id) {
            None => {
                cpu.push(ram, ERROR_DEVICE_EXISTENCE);
                return Control::Continue;
            }
            Some(info) => {
                if info.is_opened_by(pid) {
                    cpu.push(ram, ERROR_DEVICE_OPEN);
                    return Control::Continue;
                }
                if info.unused() || info.driver.is_sharable() {
                    info.add_opener(pid);
                    true
                } else {
                    false
                }
            }
        };
        if granted {
            cpu.push(ram, SUCCESS);
            return Control::Continue;
        }

        // Held by someone else and not sharable: park the caller until
        // the holder closes. The success word goes on the stack now so
        // it is under the saved SP when the process wakes.
        cpu.push(ram, SUCCESS);
        self.block_current(cpu, dev_id, IoOp::Open, 0);
        self.schedule(cpu, ram)
    }

    fn syscall_close(&mut self, cpu: &mut Cpu, ram: &mut Ram) {
        let dev_id = cpu.pop(ram);
        let pid = self
            .table
            .current_pid()
            .expect("syscall with no current process");

        let released = match self.devices.find_mut(dev_id) {
            None => Err(ERROR_DEVICE_EXISTENCE),
            Some(info) => {
                if info.is_opened_by(pid) {
                    info.remove_opener(pid);
                    Ok(())
                } else {
                    Err(ERROR_DEVICE_NOT_OPEN)
                }
            }
        };
        match released {
            Err(code) => cpu.push(ram, code),
            Ok(()) => {
                // Hand the device to the first process waiting to open
                // it, if any; it wakes holding the device.
                if let Some(waiter) = self.table.select_blocked(dev_id, IoOp::Open, 0) {
                    let now = cpu.ticks();
                    if let Some(pcb) = self.table.get_mut(waiter) {
                        pcb.unblock(now);
                    }
                    if let Some(info) = self.devices.find_mut(dev_id) {
                        info.add_opener(waiter);
                    }
                    debug!("device {} handed to waiting process {}", dev_id, waiter);
                }
                cpu.push(ram, SUCCESS);
            }
        }
    }

    fn syscall_read(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        let addr = cpu.pop(ram);
        let dev_id = cpu.pop(ram);
        let pid = self
            .table
            .current_pid()
            .expect("syscall with no current process");

        let started = match self.devices.find_mut(dev_id) {
            None => Err(ERROR_DEVICE_EXISTENCE),
            Some(info) => {
                if !info.is_opened_by(pid) {
                    Err(ERROR_DEVICE_NOT_OPEN)
                } else if !info.driver.is_readable() {
                    Err(ERROR_DEVICE_NOT_READABLE)
                } else if info.driver.is_available() {
                    info.driver.read(addr);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        };
        match started {
            Err(code) => {
                cpu.push(ram, code);
                Control::Continue
            }
            Ok(true) => {
                self.block_current(cpu, dev_id, IoOp::Read, addr);
                self.schedule(cpu, ram)
            }
            Ok(false) => {
                // Device busy: rebuild the call on the stack and rewind
                // PC so the TRAP re-executes when the process runs next.
                cpu.push(ram, dev_id);
                cpu.push(ram, addr);
                cpu.push(ram, SYSCALL_READ);
                cpu.set_pc(cpu.pc() - INSTR_SIZE);
                self.schedule(cpu, ram)
            }
        }
    }

    fn syscall_write(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        let data = cpu.pop(ram);
        let addr = cpu.pop(ram);
        let dev_id = cpu.pop(ram);
        let pid = self
            .table
            .current_pid()
            .expect("syscall with no current process");

        let started = match self.devices.find_mut(dev_id) {
            None => Err(ERROR_DEVICE_EXISTENCE),
            Some(info) => {
                if !info.is_opened_by(pid) {
                    Err(ERROR_DEVICE_NOT_OPEN)
                } else if !info.driver.is_writeable() {
                    Err(ERROR_DEVICE_NOT_WRITEABLE)
                } else if info.driver.is_available() {
                    info.driver.write(addr, data);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        };
        match started {
            Err(code) => {
                cpu.push(ram, code);
                Control::Continue
            }
            Ok(true) => {
                self.block_current(cpu, dev_id, IoOp::Write, addr);
                self.schedule(cpu, ram)
            }
            Ok(false) => {
                cpu.push(ram, dev_id);
                cpu.push(ram, addr);
                cpu.push(ram, data);
                cpu.push(ram, SYSCALL_WRITE);
                cpu.set_pc(cpu.pc() - INSTR_SIZE);
                self.schedule(cpu, ram)
            }
        }
    }

    /// Spawn a new process from a semi-randomly chosen registered
    /// program: uniform among the least-launched entries, so the catalog
    /// gets exercised evenly. The new process becomes current with PC
    /// rewound one instruction, landing the CPU's post-increment on its
    /// first word.
    fn syscall_exec(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        if self.programs.is_empty() {
            error!("EXEC with no registered programs; halting");
            return Control::Exit(-1);
        }

        let least = self
            .programs
            .iter()
            .map(|e| e.call_count)
            .min()
            .unwrap_or(0);
        let candidates: Vec<usize> = (0..self.program_count())
            .filter(|i| self.programs[*i].call_count == least)
            .collect();
        let index = candidates[self.rng.gen_range(0..candidates.len())];
        self.programs[index].call_count += 1;

        if self.create_process(index, cpu, ram) {
            cpu.set_pc(cpu.pc() - INSTR_SIZE);
        } else {
            cpu.push(ram, ERROR_NEED_MORE_SPACE);
        }
        Control::Continue
    }

    /// Dump the register file and the top three stack words, then exit
    /// the process.
    fn syscall_coredump(&mut self, cpu: &mut Cpu, ram: &mut Ram) -> Control {
        println!("{}", cpu.dump_registers());
        for _ in 0..3 {
            let value = cpu.pop(ram);
            println!("OUTPUT: {}", value);
            self.console.push(value);
        }
        self.syscall_exit(cpu, ram)
    }

    fn block_current(&mut self, cpu: &mut Cpu, dev: Word, op: IoOp, addr: Word) {
        if let Some(pcb) = self.table.current_mut() {
            pcb.block(cpu, dev, op, addr);
            debug!("process {} blocked for {:?} on device {}", pcb.pid(), op, dev);
        }
    }
}
