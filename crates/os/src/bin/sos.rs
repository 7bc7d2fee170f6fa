use anyhow::{bail, ensure, Result};
use clap::{Parser, ValueEnum};
use kernel::SchedPolicy;
use os::{Computer, SimDevice};
use program::ProgramBuilder;
use types::{Word, ERROR_NO_PROCESSES};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Starvation,
    Random,
}

/// Run the simulated operating system on a small demo workload: the boot
/// program writes to the console device, spawns a child via EXEC and
/// exits once the child is done.
#[derive(Parser, Debug)]
#[command(name = "sos")]
struct Args {
    /// RAM size in words
    #[arg(long, default_value_t = 3000)]
    ram_size: Word,

    /// Seed for the kernel's RNG (EXEC choice, random scheduling);
    /// random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Scheduler policy
    #[arg(long, value_enum, default_value_t = Policy::Starvation)]
    policy: Policy,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    ensure!(args.ram_size >= 64, "ram-size must be at least 64 words");

    let mut computer = match args.seed {
        Some(seed) => Computer::with_seed(args.ram_size, seed),
        None => Computer::new(args.ram_size),
    };
    computer.sos_mut().set_policy(match args.policy {
        Policy::Starvation => SchedPolicy::Starvation,
        Policy::Random => SchedPolicy::Random,
    });

    let console = SimDevice::new(computer.interrupts());
    computer.register_device(Box::new(console), 1);
    let sensor = SimDevice::new(computer.interrupts())
        .sharable(true)
        .writeable(false);
    computer.register_device(Box::new(sensor), 2);

    // The one program EXEC may spawn: report the pid and exit.
    let child = ProgramBuilder::new()
        .set(0, 2) // GETPID
        .push(0)
        .trap()
        .pop(1)
        .push(1) // OUTPUT the pid
        .set(0, 1)
        .push(0)
        .trap()
        .set(0, 0) // EXIT
        .push(0)
        .trap()
        .build("report-pid");
    computer.add_program(child);

    // Boot program: open the console, write 42 to cell 0, close, spawn a
    // child, yield, exit.
    let boot = ProgramBuilder::new()
        .set(1, 1) // OPEN device 1
        .push(1)
        .set(0, 3)
        .push(0)
        .trap()
        .pop(4)
        .set(1, 1) // WRITE device 1, addr 0, data 42
        .push(1)
        .set(1, 0)
        .push(1)
        .set(1, 42)
        .push(1)
        .set(0, 6)
        .push(0)
        .trap()
        .pop(4)
        .set(1, 1) // CLOSE device 1
        .push(1)
        .set(0, 4)
        .push(0)
        .trap()
        .pop(4)
        .set(0, 7) // EXEC
        .push(0)
        .trap()
        .set(0, 8) // YIELD
        .push(0)
        .trap()
        .set(0, 0) // EXIT
        .push(0)
        .trap()
        .build("boot");

    ensure!(computer.launch(&boot), "boot program does not fit in RAM");

    let code = computer.run();
    println!("console transcript: {:?}", computer.sos().console());
    if code == ERROR_NO_PROCESSES {
        // The table drained; that is the normal end of a simulation.
        Ok(())
    } else {
        bail!("simulation halted with unexpected code {}", code)
    }
}
