//! Headless capture: PNG screenshots of the framebuffer.

use std::error::Error;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use crate::framebuffer::{COLOR_BLACK, COLOR_WHITE};
use crate::Oberon;

/// Save the current framebuffer as a PNG file.
///
/// Display words are stored bottom-up with the least significant bit
/// leftmost; this walks them top-down and expands each bit to the
/// solarized palette.
pub fn save_screenshot(machine: &Oberon, path: &Path) -> Result<(), Box<dyn Error>> {
    let fb = machine.framebuffer();
    let width = fb.width();
    let height = fb.height();

    let file = fs::File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y_out in 0..height {
        let row = height - 1 - y_out;
        for col in 0..width / 32 {
            let mut word = fb.word(row, col);
            for _ in 0..32 {
                let argb = if word & 1 != 0 { COLOR_WHITE } else { COLOR_BLACK };
                rgba.push((argb >> 16) as u8);
                rgba.push((argb >> 8) as u8);
                rgba.push(argb as u8);
                rgba.push(0xFF);
                word >>= 1;
            }
        }
    }

    writer.write_image_data(&rgba)?;
    Ok(())
}
