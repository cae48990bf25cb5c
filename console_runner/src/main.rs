//! run-console boots a ROM image with the ACIA bridged to the host
//! terminal: transmitted characters appear on stdout and keystrokes
//! feed the receive queue.
use clap::Parser;
use color_eyre::eyre::Result;
use runner::{run_loop, RawModeGuard, System};

/// run-console executes a ROM image with the serial port wired to this
/// terminal. The terminal is put into raw mode for character-at-a-time
/// input and restored on exit. Interrupt with ctrl-c to stop.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(help = "Filename containing the binary ROM image")]
    rom: String,

    #[arg(help = "Emulated clock rate in cycles per second. 0 or absent runs unpaced")]
    clock_hz: Option<u64>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args = Args::parse();

    let rom = runner::load_rom(&args.rom)?;
    let mut system = System::new(rom, Some(runner::console_acia()))?;

    // Keep the guard alive for the whole run so any exit path restores
    // the terminal.
    let _guard = RawModeGuard::enable()?;
    run_loop(&mut system, args.clock_hz.unwrap_or(0), |_| Ok(()))?;
    println!();
    Ok(())
}
