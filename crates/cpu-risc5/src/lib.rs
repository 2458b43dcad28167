//! RISC5 CPU core for the Project Oberon workstation.
//!
//! The RISC5 is Niklaus Wirth's 32-bit word-addressed processor: 16 general
//! registers, an auxiliary `H` register, NZCV flags, and a small instruction
//! set in four formats (register F0/F1, memory F2, branch F3). The
//! floating-point unit reproduces the FPGA Verilog bit-for-bit, including its
//! custom rounding; Oberon binaries probe those exact bit patterns.
//!
//! The CPU accesses memory and I/O through the [`Bus`] trait. One call to
//! [`Risc5::step`] fetches, decodes, and executes a single instruction.

mod bus;
mod cpu;
pub mod fp;

pub use bus::{Bus, SimpleBus};
pub use cpu::{Fault, Risc5, ROM_START, ROM_WORDS};
