//! Project Oberon RISC workstation emulator.
//!
//! Emulates the machine described in Niklaus Wirth's *Project Oberon*: the
//! RISC5 CPU with a bit-mapped 1024x768 framebuffer, PS/2 keyboard, mouse,
//! and SPI-attached SD-card storage. The host frontend drives the
//! [`Oberon`] machine once per display frame and repaints whatever the
//! damage tracker reports.
//!
//! Peripherals attach through the capability traits in [`io`]; the bundled
//! implementations cover the SD-card [`Disk`], the [`PcLink`] file-transfer
//! protocol, a [`RawSerial`] port, and the host [`ClipboardBridge`].

pub mod capture;
mod clipboard;
mod config;
mod disk;
mod framebuffer;
pub mod io;
pub mod keyboard_map;
mod leds;
mod oberon;
mod pclink;
pub mod rom;
mod serial;

pub use clipboard::ClipboardBridge;
pub use config::{MachineConfig, MAX_HEIGHT, MAX_WIDTH};
pub use cpu_risc5::Fault;
pub use disk::Disk;
pub use framebuffer::{Framebuffer, Rect, COLOR_BLACK, COLOR_WHITE};
pub use io::{Clipboard, HostClipboard, Led, Serial, Spi};
pub use leds::ConsoleLeds;
pub use oberon::{Oberon, OberonBus, FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH};
pub use pclink::PcLink;
pub use serial::RawSerial;
