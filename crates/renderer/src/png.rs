//! PNG encoding for canvas frames.
//!
//! Two encodings:
//! - **Indexed PNG (color type 3)** when the frame has at most 256 distinct
//!   RGBA values, which is typical for a scalar overlay without trails.
//! - **RGBA PNG (color type 6)** otherwise.
//!
//! [`encode_pixmap`] picks automatically.

use std::collections::HashMap;
use std::io::Write;

use tiny_skia::Pixmap;

use crate::error::{RenderError, Result};

const MAX_PALETTE_SIZE: usize = 256;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Encode a canvas, un-premultiplying its pixels.
pub fn encode_pixmap(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let mut rgba = Vec::with_capacity(pixmap.pixels().len() * 4);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    create_png_auto(&rgba, pixmap.width() as usize, pixmap.height() as usize)
}

/// Indexed when the palette fits, RGBA otherwise.
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    check_len(pixels.len(), width, height, 4)?;
    match extract_palette(pixels) {
        Some((palette, indices)) => create_png_indexed(width, height, &palette, &indices),
        None => create_png(pixels, width, height),
    }
}

#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

/// Palette plus per-pixel indices, or `None` past 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<[u8; 4]> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2], chunk[3]);
        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push([chunk[0], chunk[1], chunk[2], chunk[3]]);
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Indexed PNG from a palette and one index byte per pixel.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[[u8; 4]],
    indices: &[u8],
) -> Result<Vec<u8>> {
    check_len(indices.len(), width, height, 1)?;
    let mut png = Vec::new();
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    write_chunk(&mut png, b"IDAT", &deflate_scanlines(indices, width, height, 1)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// RGBA PNG from straight (non-premultiplied) pixels.
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    check_len(pixels.len(), width, height, 4)?;
    let mut png = Vec::new();
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));
    write_chunk(&mut png, b"IDAT", &deflate_scanlines(pixels, width, height, 4)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn check_len(len: usize, width: usize, height: usize, bytes_per_pixel: usize) -> Result<()> {
    let expected = width * height * bytes_per_pixel;
    if len != expected || width == 0 || height == 0 {
        return Err(RenderError::Encode(format!(
            "{}x{} image needs {} bytes, got {}",
            width, height, expected, len
        )));
    }
    Ok(())
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(width as u32).to_be_bytes());
    data.extend_from_slice(&(height as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression
    data.push(0); // filter
    data.push(0); // interlace
    data
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Prefix each scanline with filter type 0 and zlib-compress.
fn deflate_scanlines(data: &[u8], width: usize, height: usize, bytes_per_pixel: usize) -> Result<Vec<u8>> {
    let stride = width * bytes_per_pixel;
    let mut raw = Vec::with_capacity(height * (1 + stride));
    for row in data.chunks_exact(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder
        .write_all(&raw)
        .map_err(|e| RenderError::Encode(format!("IDAT compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| RenderError::Encode(format!("IDAT compression failed: {}", e)))
}
