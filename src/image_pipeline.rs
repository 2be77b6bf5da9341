//! Cover image decoding and downscaling helpers.

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes any format `image` supports, retrying malformed JPEGs with a lenient decoder.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

pub fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}

fn downscale(decoded: DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let mut current = decoded;
    let mut current_dims = current.dimensions();
    let target_w = target_width.max(1);
    let target_h = target_height.max(1);

    // Halve in steps first; a single large reduction aliases badly on detailed artwork.
    while current_dims.0 > target_w.saturating_mul(2) || current_dims.1 > target_h.saturating_mul(2)
    {
        let next_w = (current_dims.0 / 2).max(target_w);
        let next_h = (current_dims.1 / 2).max(target_h);
        current = current.resize_exact(next_w, next_h, FilterType::Triangle);
        current_dims = current.dimensions();
    }

    if current_dims.0 == target_w && current_dims.1 == target_h {
        return current;
    }

    let ratio = current_dims.0.max(current_dims.1).max(1) as f32
        / target_w.max(target_h).max(1) as f32;
    let source = if ratio > 1.8 {
        current.blur(0.6)
    } else {
        current
    };
    source.resize_exact(target_w, target_h, FilterType::CatmullRom)
}

/// Decodes downloaded artwork and bounds its longest edge by `max_edge_px`.
pub fn normalize_cover_bytes(bytes: &[u8], max_edge_px: u32) -> Option<RgbaImage> {
    let decoded = decode_image_from_memory_with_fallback(bytes)?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) = fit_to_max_edge(width, height, max_edge_px);
    if (target_width, target_height) == (width, height) {
        return Some(decoded.into_rgba8());
    }
    Some(downscale(decoded, target_width, target_height).into_rgba8())
}
