use crate::{
    bus::Bus,
    cartridge::Cartridge,
    cpu::{Cpu, Fault},
    input::Button,
};

// 154 lines of 456 ticks
const FRAME_TICKS: u64 = 70224;

/// The assembled console: CPU plus everything behind the bus.
pub struct Machine {
    pub cpu: Cpu,
    pub bus: Bus,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
        }
    }

    pub fn insert(&mut self, cart: Cartridge) {
        self.bus.insert(cart);
    }

    /// Execute one CPU step: a pending interrupt dispatch and one
    /// instruction, or a single idle cycle while halted or stopped.
    pub fn step(&mut self) {
        self.cpu.step(&mut self.bus);
    }

    /// Run until the next frame is complete. Returns false if the CPU is
    /// frozen on a fault or the display is off, in which case the machine
    /// has still been advanced by up to two frames' worth of ticks so a
    /// host loop keeps its pacing.
    pub fn run_frame(&mut self) -> bool {
        self.bus.ppu.clear_frame_flag();
        let start = self.bus.ticks();
        while !self.bus.ppu.frame_ready() {
            if self.cpu.fault().is_some() {
                return false;
            }
            if self.bus.ticks() - start >= 2 * FRAME_TICKS {
                return false;
            }
            self.cpu.step(&mut self.bus);
        }
        true
    }

    pub fn frame_ready(&self) -> bool {
        self.bus.ppu.frame_ready()
    }

    /// The last completed frame: one palette-mapped shade (0-3) per pixel,
    /// row major, 160x144.
    pub fn frame(&self) -> &[u8; 160 * 144] {
        self.bus.ppu.framebuffer()
    }

    /// Frames completed since power on.
    pub fn frames(&self) -> u64 {
        self.bus.ppu.frames()
    }

    /// Ticks elapsed since power on.
    pub fn ticks(&self) -> u64 {
        self.bus.ticks()
    }

    pub fn fault(&self) -> Option<Fault> {
        self.cpu.fault()
    }

    pub fn press(&mut self, button: Button) {
        self.bus.input.press(button, &mut self.bus.if_reg);
    }

    pub fn release(&mut self, button: Button) {
        self.bus.input.release(button);
    }

    /// Drain the bytes the program pushed out through the serial port.
    pub fn serial_output(&mut self) -> Vec<u8> {
        self.bus.take_serial()
    }

    /// Return to the power-on state, keeping the inserted cartridge.
    pub fn reset(&mut self) {
        let cart = self.bus.cart.take();
        self.cpu = Cpu::new();
        self.bus = Bus::new();
        if let Some(cart) = cart {
            self.bus.insert(cart);
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
