use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;
use dotmatrix_core::cartridge::Cartridge;
use dotmatrix_core::machine::Machine;
use log::info;

/// Headless runner for the dotmatrix emulation core.
#[derive(Parser)]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Write the final frame to this path as a PGM image
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Print bytes the program sends over the serial port
    #[arg(long)]
    serial: bool,

    /// Print the CPU state after every frame
    #[arg(long)]
    trace_cpu: bool,
}

fn print_serial(bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    print!("[SERIAL] ");
    for b in bytes {
        if b.is_ascii_graphic() || *b == b' ' {
            print!("{}", *b as char);
        } else {
            print!("\\x{b:02X}");
        }
    }
    println!();
}

/// Binary PGM, one gray byte per pixel, shade 0 lightest.
fn write_pgm(path: &Path, frame: &[u8; 160 * 144]) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(16 + frame.len());
    out.extend_from_slice(b"P5\n160 144\n255\n");
    out.extend(frame.iter().map(|&shade| 255 - shade * 85));
    std::fs::write(path, out)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load ROM: {e}");
            exit(1);
        }
    };
    info!("running \"{}\" ({:?})", cart.title(), cart.kind());

    let mut machine = Machine::new();
    machine.insert(cart);

    for _ in 0..args.frames {
        if !machine.run_frame() {
            if let Some(fault) = machine.fault() {
                eprintln!("CPU fault: {fault}");
                exit(1);
            }
            // Display is off; the machine still advanced a frame's worth
            // of time, so the loop keeps its pacing.
        }
        if args.serial {
            print_serial(&machine.serial_output());
        }
        if args.trace_cpu {
            println!("{}", machine.cpu.debug_state());
        }
    }

    if let Some(path) = &args.dump {
        if let Err(e) = write_pgm(path, machine.frame()) {
            eprintln!("Failed to write '{}': {e}", path.display());
            exit(1);
        }
        println!("Wrote 160x144 frame to '{}'", path.display());
    }
}
