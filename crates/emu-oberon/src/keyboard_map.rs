//! Host keyboard to PS/2 scancode translation.
//!
//! The guest expects raw PS/2 set-2 byte sequences: make code on press,
//! `0xF0` prefix on release, `0xE0` prefix for extended keys. Two quirks
//! carried over from real keyboards:
//!
//! - Navigation keys share codes with the numeric keypad and emit fake
//!   shift presses so the guest sees them regardless of Num Lock (which we
//!   assume active).
//! - Keypad divide emits fake shift *releases* first, because the physical
//!   key reports a shifted code.
//!
//! See <https://wiki.osdev.org/PS/2_Keyboard> for the command list.

use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Normal,
    Extended,
    NumLockHack,
    ShiftHack,
}

/// PS/2 set-2 code and translation rule for one host key.
fn lookup(key: KeyCode) -> Option<(u8, Kind)> {
    use Kind::{Extended, NumLockHack, Normal, ShiftHack};
    let entry = match key {
        KeyCode::KeyA => (0x1C, Normal),
        KeyCode::KeyB => (0x32, Normal),
        KeyCode::KeyC => (0x21, Normal),
        KeyCode::KeyD => (0x23, Normal),
        KeyCode::KeyE => (0x24, Normal),
        KeyCode::KeyF => (0x2B, Normal),
        KeyCode::KeyG => (0x34, Normal),
        KeyCode::KeyH => (0x33, Normal),
        KeyCode::KeyI => (0x43, Normal),
        KeyCode::KeyJ => (0x3B, Normal),
        KeyCode::KeyK => (0x42, Normal),
        KeyCode::KeyL => (0x4B, Normal),
        KeyCode::KeyM => (0x3A, Normal),
        KeyCode::KeyN => (0x31, Normal),
        KeyCode::KeyO => (0x44, Normal),
        KeyCode::KeyP => (0x4D, Normal),
        KeyCode::KeyQ => (0x15, Normal),
        KeyCode::KeyR => (0x2D, Normal),
        KeyCode::KeyS => (0x1B, Normal),
        KeyCode::KeyT => (0x2C, Normal),
        KeyCode::KeyU => (0x3C, Normal),
        KeyCode::KeyV => (0x2A, Normal),
        KeyCode::KeyW => (0x1D, Normal),
        KeyCode::KeyX => (0x22, Normal),
        KeyCode::KeyY => (0x35, Normal),
        KeyCode::KeyZ => (0x1A, Normal),

        KeyCode::Digit1 => (0x16, Normal),
        KeyCode::Digit2 => (0x1E, Normal),
        KeyCode::Digit3 => (0x26, Normal),
        KeyCode::Digit4 => (0x25, Normal),
        KeyCode::Digit5 => (0x2E, Normal),
        KeyCode::Digit6 => (0x36, Normal),
        KeyCode::Digit7 => (0x3D, Normal),
        KeyCode::Digit8 => (0x3E, Normal),
        KeyCode::Digit9 => (0x46, Normal),
        KeyCode::Digit0 => (0x45, Normal),

        KeyCode::Enter => (0x5A, Normal),
        KeyCode::Escape => (0x76, Normal),
        KeyCode::Backspace => (0x66, Normal),
        KeyCode::Tab => (0x0D, Normal),
        KeyCode::Space => (0x29, Normal),

        KeyCode::Minus => (0x4E, Normal),
        KeyCode::Equal => (0x55, Normal),
        KeyCode::BracketLeft => (0x54, Normal),
        KeyCode::BracketRight => (0x5B, Normal),
        KeyCode::Backslash => (0x5D, Normal),
        KeyCode::Semicolon => (0x4C, Normal),
        KeyCode::Quote => (0x52, Normal),
        KeyCode::Backquote => (0x0E, Normal),
        KeyCode::Comma => (0x41, Normal),
        KeyCode::Period => (0x49, Normal),
        KeyCode::Slash => (0x4A, Normal),

        KeyCode::F1 => (0x05, Normal),
        KeyCode::F2 => (0x06, Normal),
        KeyCode::F3 => (0x04, Normal),
        KeyCode::F4 => (0x0C, Normal),
        KeyCode::F5 => (0x03, Normal),
        KeyCode::F6 => (0x0B, Normal),
        KeyCode::F7 => (0x83, Normal),
        KeyCode::F8 => (0x0A, Normal),
        KeyCode::F9 => (0x01, Normal),
        KeyCode::F10 => (0x09, Normal),
        KeyCode::F11 => (0x78, Normal),
        KeyCode::F12 => (0x07, Normal),

        // Most of the keys below are not used by Oberon.
        KeyCode::Insert => (0x70, NumLockHack),
        KeyCode::Home => (0x6C, NumLockHack),
        KeyCode::PageUp => (0x7D, NumLockHack),
        KeyCode::Delete => (0x71, NumLockHack),
        KeyCode::End => (0x69, NumLockHack),
        KeyCode::PageDown => (0x7A, NumLockHack),
        KeyCode::ArrowRight => (0x74, NumLockHack),
        KeyCode::ArrowLeft => (0x68, NumLockHack),
        KeyCode::ArrowDown => (0x72, NumLockHack),
        KeyCode::ArrowUp => (0x75, NumLockHack),

        KeyCode::NumpadDivide => (0x4A, ShiftHack),
        KeyCode::NumpadMultiply => (0x7C, Normal),
        KeyCode::NumpadSubtract => (0x7B, Normal),
        KeyCode::NumpadAdd => (0x79, Normal),
        KeyCode::NumpadEnter => (0x5A, Extended),
        KeyCode::Numpad1 => (0x69, Normal),
        KeyCode::Numpad2 => (0x72, Normal),
        KeyCode::Numpad3 => (0x7A, Normal),
        KeyCode::Numpad4 => (0x6B, Normal),
        KeyCode::Numpad5 => (0x73, Normal),
        KeyCode::Numpad6 => (0x74, Normal),
        KeyCode::Numpad7 => (0x6C, Normal),
        KeyCode::Numpad8 => (0x75, Normal),
        KeyCode::Numpad9 => (0x7D, Normal),
        KeyCode::Numpad0 => (0x70, Normal),
        KeyCode::NumpadDecimal => (0x71, Normal),

        KeyCode::IntlBackslash => (0x61, Normal),
        KeyCode::ContextMenu => (0x2F, Extended),

        KeyCode::ControlLeft => (0x14, Normal),
        KeyCode::ShiftLeft => (0x12, Normal),
        KeyCode::AltLeft => (0x11, Normal),
        KeyCode::SuperLeft => (0x1F, Extended),
        KeyCode::ControlRight => (0x14, Extended),
        KeyCode::ShiftRight => (0x59, Normal),
        KeyCode::AltRight => (0x11, Extended),
        KeyCode::SuperRight => (0x27, Extended),

        _ => return None,
    };
    Some(entry)
}

/// Translate one host key transition into a PS/2 command sequence.
///
/// `left_shift`/`right_shift` give the current state of the host shift
/// keys, needed for the keypad-divide fakery. Unknown keys produce an
/// empty sequence.
#[must_use]
pub fn encode(key: KeyCode, pressed: bool, left_shift: bool, right_shift: bool) -> Vec<u8> {
    let Some((code, kind)) = lookup(key) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    match kind {
        Kind::Normal => {
            if !pressed {
                out.push(0xF0);
            }
            out.push(code);
        }
        Kind::Extended => {
            out.push(0xE0);
            if !pressed {
                out.push(0xF0);
            }
            out.push(code);
        }
        Kind::NumLockHack => {
            if pressed {
                // Fake shift press
                out.extend_from_slice(&[0xE0, 0x12, 0xE0, code]);
            } else {
                out.extend_from_slice(&[0xE0, 0xF0, code]);
                // Fake shift release
                out.extend_from_slice(&[0xE0, 0xF0, 0x12]);
            }
        }
        Kind::ShiftHack => {
            if pressed {
                // Fake shift release
                if left_shift {
                    out.extend_from_slice(&[0xE0, 0xF0, 0x12]);
                }
                if right_shift {
                    out.extend_from_slice(&[0xE0, 0xF0, 0x59]);
                }
                out.extend_from_slice(&[0xE0, code]);
            } else {
                out.extend_from_slice(&[0xE0, 0xF0, code]);
                // Fake shift press
                if right_shift {
                    out.extend_from_slice(&[0xE0, 0x59]);
                }
                if left_shift {
                    out.extend_from_slice(&[0xE0, 0x12]);
                }
            }
        }
    }
    out
}
