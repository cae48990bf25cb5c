//! run-led boots a ROM image on the breadboard machine and mirrors the
//! VIA output ports on a row of terminal LEDs.
use clap::Parser;
use color_eyre::eyre::Result;
use runner::{run_loop, LedPanel, System};

/// run-led executes a ROM image and renders port A and port B of the
/// VIA as LEDs, redrawn whenever an output changes. Interrupt with
/// ctrl-c to stop.
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
    let mut system = System::new(rom, None)?;

    let mut panel = LedPanel::stdout();
    run_loop(&mut system, args.clock_hz.unwrap_or(0), |sys| {
        let via = sys.via.borrow();
        panel.render(via.port_a_output(), via.port_b_output())
    })?;
    println!();
    Ok(())
}
