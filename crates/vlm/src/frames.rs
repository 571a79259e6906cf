//! Frame payload checks before inference.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::error::VlmError;

/// Side length of the black frame substituted for undecodable payloads.
pub const PLACEHOLDER_SIZE: u32 = 224;

/// Replace every payload that is not a decodable base64 image with a
/// black placeholder PNG, preserving order and count.
///
/// Returns the frames and how many were replaced.
pub fn normalize_frames(images: Vec<String>) -> Result<(Vec<String>, usize), VlmError> {
    let mut placeholder: Option<String> = None;
    let mut replaced = 0;
    let mut out = Vec::with_capacity(images.len());

    for payload in images {
        if is_decodable(&payload) {
            out.push(payload);
            continue;
        }
        replaced += 1;
        let frame = match &placeholder {
            Some(p) => p.clone(),
            None => {
                let p = placeholder_frame()?;
                placeholder = Some(p.clone());
                p
            }
        };
        out.push(frame);
    }

    Ok((out, replaced))
}

fn is_decodable(payload: &str) -> bool {
    if payload.is_empty() {
        return false;
    }
    match STANDARD.decode(payload) {
        Ok(bytes) => image::load_from_memory(&bytes).is_ok(),
        Err(_) => false,
    }
}

/// A black `PLACEHOLDER_SIZE`-square PNG, base64-encoded.
pub fn placeholder_frame() -> Result<String, VlmError> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| VlmError::Frame(e.to_string()))?;
    Ok(STANDARD.encode(buf.into_inner()))
}
