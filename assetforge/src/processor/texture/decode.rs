//! Raw pixel payload decoding.

use image::{Rgba, RgbaImage};

use super::TextureError;
use crate::bundle::{TextureData, TextureFormat};

/// Decode a texture payload into RGBA, keeping the stored row order
/// (bottom-up).
pub fn decode_texture(texture: &TextureData) -> Result<RgbaImage, TextureError> {
    let info = &texture.info;
    let bpp = info
        .format
        .bytes_per_pixel()
        .ok_or_else(|| TextureError::UnsupportedFormat {
            name: info.name.clone(),
            format: info.format,
        })?;

    let pixels = info.width as usize * info.height as usize;
    let expected = pixels * bpp;
    if texture.data.len() < expected {
        return Err(TextureError::BadPayload {
            name: info.name.clone(),
            expected,
            actual: texture.data.len(),
        });
    }

    let mut image = RgbaImage::new(info.width, info.height);
    let src = texture.data[..expected].chunks_exact(bpp);
    for (dst, px) in image.pixels_mut().zip(src) {
        *dst = decode_pixel(info.format, px);
    }
    Ok(image)
}

fn decode_pixel(format: TextureFormat, px: &[u8]) -> Rgba<u8> {
    match format {
        TextureFormat::Alpha8 => Rgba([255, 255, 255, px[0]]),
        TextureFormat::Rgb24 => Rgba([px[0], px[1], px[2], 255]),
        TextureFormat::Rgba32 => Rgba([px[0], px[1], px[2], px[3]]),
        TextureFormat::Argb32 => Rgba([px[1], px[2], px[3], px[0]]),
        TextureFormat::Bgra32 => Rgba([px[2], px[1], px[0], px[3]]),
        TextureFormat::Rgb565 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            let r = ((c & 0b1111_1000_0000_0000) >> 8) as u8;
            let g = ((c & 0b0000_0111_1110_0000) >> 3) as u8;
            let b = ((c & 0b0000_0000_0001_1111) << 3) as u8;
            Rgba([r, g, b, 255])
        }
        TextureFormat::Rgba4444 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            let nibble = |shift: u16| (((c >> shift) & 0xF) as u8) * 17;
            Rgba([nibble(12), nibble(8), nibble(4), nibble(0)])
        }
        // bytes_per_pixel() already rejected these
        TextureFormat::Other(_) => Rgba([0, 0, 0, 0]),
    }
}
