//! Cycle-accurate emulation core for the original DMG handheld.
//!
//! This crate contains the platform-agnostic emulator logic (CPU, bus,
//! banking, timer, PPU). Frontends live in separate crates and drive the
//! core through the [`machine`] facade: insert a cartridge, run frames,
//! read the shade buffer.

/// Pure 8/16-bit arithmetic helpers returning `(result, Flags)`.
pub mod alu;

/// Audio register pass-through; no sample synthesis.
pub mod apu;

/// Memory map, clock fan-out and OAM DMA.
pub mod bus;

/// Cartridge header parsing and the banking controllers.
pub mod cartridge;

/// LR35902 CPU core.
pub mod cpu;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod input;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod machine;

/// Pixel unit: mode timing, STAT sources, scanline compositing.
pub mod ppu;

/// Serial port register pair with captured output.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

/// Read/write/execute watch hooks for external debuggers.
pub mod watch;
