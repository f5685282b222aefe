//! Packed sprite settings word.

use image::{imageops, RgbaImage};

use super::TextureError;

/// How the packer stored a sprite in its atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteRotation {
    None,
    FlipHorizontal,
    FlipVertical,
    Rotate180,
    Rotate90,
}

impl SpriteRotation {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::None),
            1 => Some(Self::FlipHorizontal),
            2 => Some(Self::FlipVertical),
            3 => Some(Self::Rotate180),
            4 => Some(Self::Rotate90),
            _ => None,
        }
    }

    /// Undo the packing transform and convert from bottom-up texture rows
    /// to top-down image rows.
    ///
    /// Rotation is applied first, then the flip. Every variant carries the
    /// baseline vertical flip; for `FlipVertical` it cancels the packer's
    /// own vertical flip.
    pub fn restore(self, image: RgbaImage) -> RgbaImage {
        let mut out = match self {
            Self::Rotate90 => imageops::rotate90(&image),
            Self::Rotate180 => imageops::rotate180(&image),
            _ => image,
        };
        match self {
            Self::FlipVertical => {}
            Self::FlipHorizontal => {
                imageops::flip_horizontal_in_place(&mut out);
                imageops::flip_vertical_in_place(&mut out);
            }
            Self::None | Self::Rotate90 | Self::Rotate180 => {
                imageops::flip_vertical_in_place(&mut out);
            }
        }
        out
    }
}

/// Decoded settings word.
///
/// ```text
/// bit 0     packed (0 = packed)
/// bit 1     packing mode (0 = tight)
/// bits 2-5  rotation
/// bit 6     mesh type (1 = tight)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteSettings {
    raw: u32,
}

impl SpriteSettings {
    pub fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn is_packed(&self) -> bool {
        self.raw & 1 == 0
    }

    pub fn is_packing_tight(&self) -> bool {
        (self.raw >> 1) & 1 == 0
    }

    pub fn is_mesh_tight(&self) -> bool {
        (self.raw >> 6) & 1 == 1
    }

    /// Packing rotation; values outside the known set are an error.
    pub fn rotation(&self) -> Result<SpriteRotation, TextureError> {
        let bits = (self.raw >> 2) & 0xF;
        SpriteRotation::from_bits(bits).ok_or(TextureError::UnknownRotation(bits))
    }
}
