//! Packed bundle format.
//!
//! A small self-describing container used by the tooling and the test suite:
//!
//! ```text
//! "AFB1" | zlib( bincode( PackedBundle ) )
//! ```
//!
//! Third-party container formats plug in through the same
//! [`Container`]/[`ContainerReader`] traits.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::container::{Container, ContainerError, ContainerReader, ContainerResult};
use super::record::{
    AudioClipData, RecordInfo, RecordKind, SpriteData, TextAssetData, TextureData, TextureFormat,
    TextureInfo,
};

/// File magic.
pub const PACKED_MAGIC: &[u8; 4] = b"AFB1";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum PackedBody {
    Texture {
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Vec<u8>,
    },
    Sprite(SpriteData),
    AudioClip(Vec<u8>),
    TextAsset(Vec<u8>),
    Other(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackedRecord {
    id: i64,
    name: String,
    body: PackedBody,
}

impl PackedRecord {
    fn kind(&self) -> RecordKind {
        match self.body {
            PackedBody::Texture { .. } => RecordKind::Texture,
            PackedBody::Sprite(_) => RecordKind::Sprite,
            PackedBody::AudioClip(_) => RecordKind::AudioClip,
            PackedBody::TextAsset(_) => RecordKind::TextAsset,
            PackedBody::Other(class) => RecordKind::Other(class),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PackedBundle {
    records: Vec<PackedRecord>,
}

/// Builds packed bundle files.
#[derive(Debug, Default)]
pub struct PackedBundleWriter {
    bundle: PackedBundle,
}

impl PackedBundleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(
        &mut self,
        id: i64,
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Vec<u8>,
    ) -> &mut Self {
        self.push(
            id,
            name,
            PackedBody::Texture {
                width,
                height,
                format,
                data,
            },
        )
    }

    pub fn sprite(&mut self, id: i64, sprite: SpriteData) -> &mut Self {
        let name = sprite.name.clone();
        self.push(id, name, PackedBody::Sprite(sprite))
    }

    pub fn audio_clip(&mut self, id: i64, name: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.push(id, name, PackedBody::AudioClip(data))
    }

    pub fn text_asset(&mut self, id: i64, name: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.push(id, name, PackedBody::TextAsset(data))
    }

    /// A record of a kind no processor handles.
    pub fn other(&mut self, id: i64, name: impl Into<String>, class_id: u32) -> &mut Self {
        self.push(id, name, PackedBody::Other(class_id))
    }

    fn push(&mut self, id: i64, name: impl Into<String>, body: PackedBody) -> &mut Self {
        self.bundle.records.push(PackedRecord {
            id,
            name: name.into(),
            body,
        });
        self
    }

    /// Encode the bundle.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let payload = bincode::serialize(&self.bundle)
            .map_err(|e| io::Error::other(format!("Failed to serialize bundle: {}", e)))?;

        let mut out = PACKED_MAGIC.to_vec();
        let mut encoder = ZlibEncoder::new(&mut out, Compression::default());
        encoder.write_all(&payload)?;
        encoder.finish()?;
        Ok(out)
    }

    /// Write the bundle to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes()?)
    }
}

/// Reader for packed bundles.
///
/// Keeps its inflate buffer between files so a worker allocates it once.
#[derive(Debug, Default)]
pub struct PackedReader {
    inflated: Vec<u8>,
}

impl PackedReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContainerReader for PackedReader {
    fn open(&mut self, path: &Path) -> ContainerResult<Box<dyn Container>> {
        let raw = fs::read(path).map_err(|source| ContainerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let body = raw
            .strip_prefix(PACKED_MAGIC.as_slice())
            .ok_or_else(|| ContainerError::UnknownFormat {
                path: path.to_path_buf(),
            })?;

        self.inflated.clear();
        ZlibDecoder::new(body)
            .read_to_end(&mut self.inflated)
            .map_err(|e| ContainerError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let bundle: PackedBundle =
            bincode::deserialize(&self.inflated).map_err(|e| ContainerError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(PackedContainer::new(path.to_path_buf(), bundle)))
    }
}

/// An opened packed bundle.
#[derive(Debug)]
pub struct PackedContainer {
    path: PathBuf,
    infos: Vec<RecordInfo>,
    records: HashMap<i64, PackedRecord>,
}

impl PackedContainer {
    fn new(path: PathBuf, bundle: PackedBundle) -> Self {
        let infos = bundle
            .records
            .iter()
            .map(|r| RecordInfo {
                id: r.id,
                kind: r.kind(),
                name: r.name.clone(),
            })
            .collect();
        let records = bundle.records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            path,
            infos,
            records,
        }
    }

    fn record(&self, id: i64) -> ContainerResult<&PackedRecord> {
        self.records
            .get(&id)
            .ok_or(ContainerError::MissingRecord { id })
    }
}

impl Container for PackedContainer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn records(&self) -> &[RecordInfo] {
        &self.infos
    }

    fn texture_info(&self, id: i64) -> ContainerResult<TextureInfo> {
        let record = self.record(id)?;
        match &record.body {
            PackedBody::Texture {
                width,
                height,
                format,
                ..
            } => Ok(TextureInfo {
                id,
                name: record.name.clone(),
                width: *width,
                height: *height,
                format: *format,
            }),
            _ => Err(ContainerError::WrongKind {
                id,
                expected: "texture",
            }),
        }
    }

    fn texture(&self, id: i64) -> ContainerResult<TextureData> {
        let info = self.texture_info(id)?;
        match &self.record(id)?.body {
            PackedBody::Texture { data, .. } => Ok(TextureData {
                info,
                data: data.clone(),
            }),
            _ => Err(ContainerError::WrongKind {
                id,
                expected: "texture",
            }),
        }
    }

    fn sprite(&self, id: i64) -> ContainerResult<SpriteData> {
        match &self.record(id)?.body {
            PackedBody::Sprite(sprite) => Ok(sprite.clone()),
            _ => Err(ContainerError::WrongKind {
                id,
                expected: "sprite",
            }),
        }
    }

    fn audio_clip(&self, id: i64) -> ContainerResult<AudioClipData> {
        let record = self.record(id)?;
        match &record.body {
            PackedBody::AudioClip(data) => Ok(AudioClipData {
                name: record.name.clone(),
                data: data.clone(),
            }),
            _ => Err(ContainerError::WrongKind {
                id,
                expected: "audio clip",
            }),
        }
    }

    fn text_asset(&self, id: i64) -> ContainerResult<TextAssetData> {
        let record = self.record(id)?;
        match &record.body {
            PackedBody::TextAsset(data) => Ok(TextAssetData {
                name: record.name.clone(),
                data: data.clone(),
            }),
            _ => Err(ContainerError::WrongKind {
                id,
                expected: "text asset",
            }),
        }
    }
}
