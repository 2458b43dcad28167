//! Capability interfaces between the machine and its peripherals.
//!
//! The machine holds each peripheral as a boxed trait object and never
//! learns anything beyond these methods; peripherals hold their own host
//! helpers (files, the host clipboard) and never see the machine. There are
//! no back-edges.

use std::error::Error;

/// Observer for the LED register.
pub trait Led {
    fn write(&mut self, value: u32);
}

/// Byte-stream serial peripheral (RS-232 on the FPGA).
pub trait Serial {
    /// Bit 0: receive data available. Bit 1: ready to transmit.
    fn read_status(&mut self) -> u32;
    fn read_data(&mut self) -> u32;
    fn write_data(&mut self, value: u32);
}

/// Byte-oriented SPI device. The SPI clock shifts both directions on every
/// write, so a write always precedes the matching read.
pub trait Spi {
    fn read_data(&mut self) -> u32;
    fn write_data(&mut self, value: u32);
}

/// The paced clipboard channel the guest drives through two I/O registers.
pub trait Clipboard {
    fn write_control(&mut self, len: u32);
    fn read_control(&mut self) -> u32;
    fn write_data(&mut self, value: u32);
    fn read_data(&mut self) -> u32;
}

/// Host-side clipboard access, injected into the clipboard peripheral.
pub trait HostClipboard {
    /// Current host clipboard contents.
    fn get(&mut self) -> Result<String, Box<dyn Error>>;

    /// Replace the host clipboard contents.
    fn set(&mut self, text: &str) -> Result<(), Box<dyn Error>>;
}
