//! Clipboard bridge between the guest and the host clipboard.
//!
//! Two half-duplex channels share one peripheral:
//!
//! - **Put** (guest to host): the guest arms the channel with the byte
//!   count via the control register, then streams that many data bytes.
//!   Once complete, the whole buffer goes to the host clipboard.
//! - **Get** (host to guest): reading the control register snapshots the
//!   host clipboard, returns its length, and arms the channel; the guest
//!   then drains it byte by byte.
//!
//! Oberon texts use a single CR as line terminator, so lines are normalized
//! to `\r` on the way in and `\r` is rewritten to `\n` on the way out.
//! Calls in the wrong state return 0 and change nothing.

use std::collections::VecDeque;

use crate::io::{Clipboard, HostClipboard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipState {
    Idle,
    Get,
    Put,
}

/// The clipboard peripheral, backed by a host clipboard capability.
pub struct ClipboardBridge {
    host: Box<dyn HostClipboard>,
    state: ClipState,
    data: VecDeque<u8>,
    data_len: u32,
}

impl ClipboardBridge {
    #[must_use]
    pub fn new(host: Box<dyn HostClipboard>) -> Self {
        Self {
            host,
            state: ClipState::Idle,
            data: VecDeque::new(),
            data_len: 0,
        }
    }

    fn reset(&mut self) {
        self.state = ClipState::Idle;
        self.data.clear();
        self.data_len = 0;
    }
}

impl Clipboard for ClipboardBridge {
    fn read_control(&mut self) -> u32 {
        self.reset();
        let text = match self.host.get() {
            Ok(text) => text,
            Err(err) => {
                eprintln!("clipboard: can't get host clipboard text: {err}");
                String::new()
            }
        };
        let text = text.replace("\r\n", "\r").replace('\n', "\r");
        let Ok(len) = u32::try_from(text.len()) else {
            self.reset();
            return 0;
        };
        self.data = text.into_bytes().into();
        self.data_len = len;
        self.state = ClipState::Get;
        self.data_len
    }

    fn write_control(&mut self, len: u32) {
        self.reset();
        self.state = ClipState::Put;
        self.data_len = len;
    }

    fn read_data(&mut self) -> u32 {
        if self.state != ClipState::Get {
            return 0;
        }
        match self.data.pop_front() {
            Some(byte) => u32::from(byte),
            None => {
                self.reset();
                0
            }
        }
    }

    fn write_data(&mut self, value: u32) {
        if self.state != ClipState::Put {
            return;
        }
        let mut ch = value as u8;
        if ch == b'\r' {
            ch = b'\n';
        }
        self.data.push_back(ch);
        if self.data.len() == self.data_len as usize {
            let text: String = self.data.iter().map(|&b| b as char).collect();
            if let Err(err) = self.host.set(&text) {
                eprintln!("clipboard: can't set host clipboard text: {err}");
            }
            self.reset();
        }
    }
}
