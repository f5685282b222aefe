//! Typed records held by a container.

use serde::{Deserialize, Serialize};

/// Type tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Raw texture, possibly an atlas.
    Texture,
    /// Sub-rectangle of a texture.
    Sprite,
    /// Audio bank with one or more samples.
    AudioClip,
    /// Opaque bytes, e.g. schema-encoded tables.
    TextAsset,
    /// Anything else, identified by its native class id.
    Other(u32),
}

/// Lightweight description of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    /// Container-internal identifier.
    pub id: i64,
    pub kind: RecordKind,
    pub name: String,
}

/// Raw pixel layout of a texture payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFormat {
    Alpha8,
    Rgb24,
    Rgba32,
    Argb32,
    Bgra32,
    Rgb565,
    Rgba4444,
    /// Block-compressed or otherwise undecoded format, by native id.
    Other(u32),
}

impl TextureFormat {
    /// Bytes per pixel of uncompressed formats.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Alpha8 => Some(1),
            Self::Rgb565 | Self::Rgba4444 => Some(2),
            Self::Rgb24 => Some(3),
            Self::Rgba32 | Self::Argb32 | Self::Bgra32 => Some(4),
            Self::Other(_) => None,
        }
    }
}

/// Texture header, available without reading the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureInfo {
    pub id: i64,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Texture header plus raw payload, rows bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub info: TextureInfo,
    pub data: Vec<u8>,
}

/// Fractional rectangle in texture space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpriteRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SpriteRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Render data of a sprite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpriteData {
    pub name: String,
    /// Backing color texture.
    pub texture: Option<i64>,
    /// Explicit alpha texture, if the packer emitted one.
    pub alpha_texture: Option<i64>,
    /// Region of the backing texture.
    pub rect: SpriteRect,
    pub downscale: f32,
    /// Packed settings word; see `SpriteSettings`.
    pub settings_raw: u32,
}

/// An audio bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClipData {
    pub name: String,
    pub data: Vec<u8>,
}

/// Opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAssetData {
    pub name: String,
    pub data: Vec<u8>,
}
