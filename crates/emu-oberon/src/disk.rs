//! SPI SD-card disk backed by a sector image file.
//!
//! The guest drives the card through the SPI data register; every write
//! clocks one byte each way, so responses are pulled by writing filler. Only
//! the two commands Oberon's Kernel uses are implemented:
//!
//! - `0x51` (CMD17, single block read): respond `[0x00, 0xFE]` followed by
//!   the sector as 128 little-endian words.
//! - `0x58` (CMD24, single block write): respond `[0x00]`, wait for the
//!   `0xFE` data token, accept 128 words, then respond `[0x05]`.
//!
//! Everything else is acknowledged with a lone `0x00`.
//!
//! State machine: `Command -> Read -> Command` for reads and
//! `Command -> Write -> Writing -> Command` for writes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::io::Spi;

/// First word of sector 0 in a filesystem-only image (no bootable inner
/// core). Such images start at Oberon's DiskAdr 29, so a fixed sector
/// offset is applied to every access.
const FS_ONLY_MAGIC: u32 = 0x9B1E_A38D;
const FS_ONLY_OFFSET: u32 = 0x8_0002;

const CMD_READ: u32 = 81; // 0x51
const CMD_WRITE: u32 = 88; // 0x58

/// Data token introducing the 512 data bytes of a block write.
const DATA_TOKEN: u32 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiskState {
    /// Collecting a 6-byte command frame (0xFF filler is skipped).
    Command,
    /// Read response queued; the guest clocks it out.
    Read,
    /// Write acknowledged; waiting for the data token.
    Write,
    /// Accepting the 128 data words of a write.
    Writing,
}

/// SPI SD-card emulation over a 512-byte-sector image file.
pub struct Disk {
    state: DiskState,
    file: Option<File>,
    offset: u32,

    rx_buf: [u32; 128],
    rx_idx: usize,

    tx_buf: [u32; 130],
    tx_cnt: usize,
    tx_idx: i32,
}

impl Disk {
    /// A card with no backing image; every transfer fails softly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DiskState::Command,
            file: None,
            offset: 0,
            rx_buf: [0; 128],
            rx_idx: 0,
            tx_buf: [0; 130],
            tx_cnt: 0,
            tx_idx: 0,
        }
    }

    /// Open a disk image for reading and writing.
    ///
    /// The first sector is probed: a filesystem-only image (magic
    /// `0x9B1EA38D`) is accessed with the DiskAdr 29 offset applied.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened read-write or the first sector
    /// cannot be read.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut disk = Self::new();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let sector = read_sector(&mut file)?;
        if sector[0] == FS_ONLY_MAGIC {
            disk.offset = FS_ONLY_OFFSET;
        }
        disk.file = Some(file);
        Ok(disk)
    }

    fn run_command(&mut self) -> io::Result<()> {
        let cmd = self.rx_buf[0];
        let arg = (self.rx_buf[1] << 24)
            | (self.rx_buf[2] << 16)
            | (self.rx_buf[3] << 8)
            | self.rx_buf[4];

        match cmd {
            CMD_READ => {
                self.state = DiskState::Read;
                self.tx_buf[0] = 0;
                self.tx_buf[1] = DATA_TOKEN;
                let secnum = arg.wrapping_sub(self.offset);
                let file = self.backing_file()?;
                seek_sector(file, secnum)?;
                let sector = read_sector(file)?;
                self.tx_buf[2..].copy_from_slice(&sector);
                self.tx_cnt = 2 + 128;
            }
            CMD_WRITE => {
                self.state = DiskState::Write;
                let offset = self.offset;
                let file = self.backing_file()?;
                seek_sector(file, arg.wrapping_sub(offset))?;
                self.tx_buf[0] = 0;
                self.tx_cnt = 1;
            }
            _ => {
                self.tx_buf[0] = 0;
                self.tx_cnt = 1;
            }
        }
        self.tx_idx = -1;
        Ok(())
    }

    fn backing_file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no disk image attached"))
    }
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}

impl Spi for Disk {
    fn write_data(&mut self, value: u32) {
        self.tx_idx += 1;
        match self.state {
            DiskState::Command => {
                if value as u8 != 0xFF || self.rx_idx != 0 {
                    self.rx_buf[self.rx_idx] = value;
                    self.rx_idx += 1;
                    if self.rx_idx == 6 {
                        if let Err(err) = self.run_command() {
                            // Fail softly: drop the response so the guest
                            // sees 0xFF fill, observes the error, and
                            // retries at the protocol level.
                            eprintln!("disk: can't run command: {err}");
                            self.state = DiskState::Command;
                            self.tx_cnt = 0;
                            self.tx_idx = 0;
                        }
                        self.rx_idx = 0;
                    }
                }
            }
            DiskState::Read => {
                if self.tx_idx == self.tx_cnt as i32 {
                    self.state = DiskState::Command;
                    self.tx_cnt = 0;
                    self.tx_idx = 0;
                }
            }
            DiskState::Write => {
                if value == DATA_TOKEN {
                    self.state = DiskState::Writing;
                }
            }
            DiskState::Writing => {
                if self.rx_idx < 128 {
                    self.rx_buf[self.rx_idx] = value;
                }
                self.rx_idx += 1;
                if self.rx_idx == 128 {
                    let result = match self.file.as_mut() {
                        Some(file) => write_sector(file, &self.rx_buf),
                        None => Err(io::Error::new(
                            io::ErrorKind::NotFound,
                            "no disk image attached",
                        )),
                    };
                    if let Err(err) = result {
                        eprintln!("disk: can't write to disk: {err}");
                    }
                }
                // Two CRC bytes trail the data before the response.
                if self.rx_idx == 130 {
                    self.tx_buf[0] = 5;
                    self.tx_cnt = 1;
                    self.tx_idx = -1;
                    self.rx_idx = 0;
                    self.state = DiskState::Command;
                }
            }
        }
    }

    fn read_data(&mut self) -> u32 {
        if self.tx_idx >= 0 && (self.tx_idx as usize) < self.tx_cnt {
            self.tx_buf[self.tx_idx as usize]
        } else {
            255
        }
    }
}

fn seek_sector(file: &mut File, secnum: u32) -> io::Result<()> {
    file.seek(SeekFrom::Start(u64::from(secnum) * 512))?;
    Ok(())
}

/// Read one 512-byte sector as 128 little-endian words. A short read (end
/// of image) leaves the remainder zeroed.
fn read_sector(file: &mut File) -> io::Result<[u32; 128]> {
    let mut bytes = [0u8; 512];
    let mut filled = 0;
    while filled < bytes.len() {
        match file.read(&mut bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    let mut words = [0u32; 128];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

fn write_sector(file: &mut File, words: &[u32; 128]) -> io::Result<()> {
    let mut bytes = [0u8; 512];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    file.write_all(&bytes)
}
