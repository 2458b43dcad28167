//! Raw file-backed serial port.
//!
//! Connects the guest's RS-232 to a pair of host files (or pipes). Used for
//! serial booting (`--boot-from-serial` with the inner core on the input
//! file) and for capturing guest output.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::io::Serial;

/// Serial peripheral streaming bytes from an input file to the guest and
/// guest output to an output file. Either side may be absent.
pub struct RawSerial {
    reader: Option<BufReader<File>>,
    writer: Option<File>,
}

impl RawSerial {
    /// Open the given input and output files.
    ///
    /// # Errors
    ///
    /// Fails if either file cannot be opened.
    pub fn open(input: Option<&Path>, output: Option<&Path>) -> io::Result<Self> {
        let reader = match input {
            Some(path) => Some(BufReader::new(File::open(path)?)),
            None => None,
        };
        let writer = match output {
            Some(path) => Some(File::options().read(true).write(true).open(path)?),
            None => None,
        };
        Ok(Self { reader, writer })
    }
}

impl Serial for RawSerial {
    fn read_status(&mut self) -> u32 {
        // Bit 0 signals a byte waiting, bit 1 transmit ready.
        match &mut self.reader {
            Some(reader) => match reader.fill_buf() {
                Ok(buf) if !buf.is_empty() => 3,
                _ => 2,
            },
            None => 2,
        }
    }

    fn read_data(&mut self) -> u32 {
        let mut byte = [0u8; 1];
        if let Some(reader) = &mut self.reader {
            if let Err(err) = reader.read_exact(&mut byte) {
                eprintln!("serial: can't read data: {err}");
            }
        }
        u32::from(byte[0])
    }

    fn write_data(&mut self, value: u32) {
        if let Some(writer) = &mut self.writer {
            if let Err(err) = writer.write_all(&[value as u8]) {
                eprintln!("serial: can't write data: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "emu-oberon-serial-{}-{name}",
            std::process::id()
        ));
        fs::write(&path, content).expect("write temp file");
        path
    }

    #[test]
    fn reads_bytes_until_exhausted() {
        let input = temp_file("in", b"\x01\x02");
        let mut serial = RawSerial::open(Some(&input), None).expect("open");

        assert_eq!(serial.read_status(), 3);
        assert_eq!(serial.read_data(), 1);
        assert_eq!(serial.read_status(), 3);
        assert_eq!(serial.read_data(), 2);
        assert_eq!(serial.read_status(), 2);

        let _ = fs::remove_file(&input);
    }

    #[test]
    fn writes_bytes_to_output() {
        let output = temp_file("out", b"");
        let mut serial = RawSerial::open(None, Some(&output)).expect("open");

        serial.write_data(0x4F);
        serial.write_data(0x42);
        drop(serial);

        assert_eq!(fs::read(&output).expect("read back"), b"OB");
        let _ = fs::remove_file(&output);
    }

    #[test]
    fn unattached_sides_are_inert() {
        let mut serial = RawSerial::open(None, None).expect("open");
        assert_eq!(serial.read_status(), 2);
        serial.write_data(0xFF);
    }
}
