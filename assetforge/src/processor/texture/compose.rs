//! Sprite rectangle extraction and alpha merge.

use image::{Rgba, RgbaImage};

use super::TextureError;
use crate::bundle::SpriteRect;

/// Integer pixel rectangle covering a fractional sprite rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Smallest pixel rectangle containing `rect`: the origin is floored and
    /// the far edge is ceiled, so partially covered pixels are kept.
    pub fn covering(rect: SpriteRect) -> Result<Self, TextureError> {
        let left = rect.x.floor();
        let bottom = rect.y.floor();
        let right = (rect.x + rect.width).ceil();
        let top = (rect.y + rect.height).ceil();

        let valid = [left, bottom, right, top].iter().all(|v| v.is_finite())
            && left >= 0.0
            && bottom >= 0.0
            && right >= left
            && top >= bottom;
        if !valid {
            return Err(TextureError::InvalidRect(rect));
        }

        Ok(Self {
            x: left as u32,
            y: bottom as u32,
            width: (right - left) as u32,
            height: (top - bottom) as u32,
        })
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// Cut `rect` out of `color`, taking alpha from the red channel of `alpha`
/// (same dimensions as `color`) or 255 without one.
pub fn compose(
    color: &RgbaImage,
    alpha: Option<&RgbaImage>,
    rect: PixelRect,
) -> Result<RgbaImage, TextureError> {
    if !rect.fits(color.width(), color.height()) {
        return Err(TextureError::RectOutOfBounds {
            rect,
            width: color.width(),
            height: color.height(),
        });
    }
    if let Some(alpha) = alpha {
        if !rect.fits(alpha.width(), alpha.height()) {
            return Err(TextureError::RectOutOfBounds {
                rect,
                width: alpha.width(),
                height: alpha.height(),
            });
        }
    }

    let out = RgbaImage::from_fn(rect.width, rect.height, |x, y| {
        let (sx, sy) = (rect.x + x, rect.y + y);
        let c = color.get_pixel(sx, sy);
        let a = alpha.map_or(255, |alpha| alpha.get_pixel(sx, sy)[0]);
        Rgba([c[0], c[1], c[2], a])
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each pixel encodes its coordinates.
    fn coord_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 99]))
    }

    #[test]
    fn test_covering_integral() {
        let rect = PixelRect::covering(SpriteRect::new(2.0, 3.0, 4.0, 5.0)).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 2,
                y: 3,
                width: 4,
                height: 5
            }
        );
    }

    #[test]
    fn test_covering_fractional_keeps_edges() {
        // spans 1.5..4.25 horizontally, 0.5..1.5 vertically
        let rect = PixelRect::covering(SpriteRect::new(1.5, 0.5, 2.75, 1.0)).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 1,
                y: 0,
                width: 4,
                height: 2
            }
        );
    }

    #[test]
    fn test_covering_rejects_negative() {
        assert!(PixelRect::covering(SpriteRect::new(-1.0, 0.0, 2.0, 2.0)).is_err());
        assert!(PixelRect::covering(SpriteRect::new(0.0, 0.0, f32::NAN, 2.0)).is_err());
    }

    #[test]
    fn test_compose_without_alpha_is_opaque() {
        let color = coord_image(8, 8);
        let rect = PixelRect {
            x: 2,
            y: 1,
            width: 3,
            height: 2,
        };
        let out = compose(&color, None, rect).unwrap();

        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(out.get_pixel(0, 0), &Rgba([2, 1, 7, 255]));
        assert_eq!(out.get_pixel(2, 1), &Rgba([4, 2, 7, 255]));
    }

    #[test]
    fn test_compose_alpha_from_red_channel() {
        let color = coord_image(4, 4);
        let alpha = RgbaImage::from_fn(4, 4, |x, y| Rgba([(x * 10 + y) as u8, 0, 0, 255]));
        let rect = PixelRect {
            x: 1,
            y: 2,
            width: 2,
            height: 2,
        };
        let out = compose(&color, Some(&alpha), rect).unwrap();

        assert_eq!(out.get_pixel(0, 0)[3], 12);
        assert_eq!(out.get_pixel(1, 1)[3], 23);
    }

    #[test]
    fn test_compose_out_of_bounds() {
        let color = coord_image(4, 4);
        let rect = PixelRect {
            x: 3,
            y: 0,
            width: 2,
            height: 1,
        };
        assert!(matches!(
            compose(&color, None, rect),
            Err(TextureError::RectOutOfBounds { .. })
        ));
    }
}
