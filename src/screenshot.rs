use std::fs;
use std::io::BufWriter;
use std::path::Path;

use crate::error::BridgeError;
use crate::link::Frame;

/// Encode a captured frame as an RGB PNG file.
pub fn save_png(path: &Path, frame: &Frame) -> Result<(), BridgeError> {
    if frame.pixels.is_empty() {
        return Err(BridgeError::NoFrame);
    }
    let file = fs::File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, frame.width as u32, frame.height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(frame.as_rgb_bytes())?;
    Ok(())
}
