//! Per-container texture cache.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::decode::decode_texture;
use super::TextureError;
use crate::bundle::Container;

/// A decoded texture and the resized copies made from it.
#[derive(Debug)]
pub struct CachedTexture {
    pub name: String,
    pub image: RgbaImage,
    /// Consumed by at least one sprite.
    pub used: bool,
    resized: HashMap<(u32, u32), RgbaImage>,
}

impl CachedTexture {
    fn new(name: String, image: RgbaImage) -> Self {
        Self {
            name,
            image,
            used: false,
            resized: HashMap::new(),
        }
    }

    /// Number of distinct resized copies held.
    pub fn resized_len(&self) -> usize {
        self.resized.len()
    }
}

/// Decoded textures of one container, keyed by record id.
///
/// Owned by the worker processing the container and dropped with it.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<i64, CachedTexture>,
    resizes: usize,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&CachedTexture> {
        self.entries.get(&id)
    }

    /// Decode texture `id` unless already cached.
    pub fn load(&mut self, container: &dyn Container, id: i64) -> Result<&mut CachedTexture, TextureError> {
        if !self.entries.contains_key(&id) {
            let texture = container.texture(id)?;
            let image = decode_texture(&texture)?;
            self.entries
                .insert(id, CachedTexture::new(texture.info.name, image));
        }
        self.entries
            .get_mut(&id)
            .ok_or(TextureError::NotCached(id))
    }

    /// Load texture `id` and mark it consumed.
    pub fn resolve(&mut self, container: &dyn Container, id: i64) -> Result<&RgbaImage, TextureError> {
        let entry = self.load(container, id)?;
        entry.used = true;
        Ok(&entry.image)
    }

    /// Copy of cached texture `id` at `width` x `height`.
    ///
    /// Returns the texture itself when it already has that size. Each target
    /// size is resized once and reused afterwards.
    pub fn resized_alpha(&mut self, id: i64, width: u32, height: u32) -> Result<&RgbaImage, TextureError> {
        let entry = self.entries.get_mut(&id).ok_or(TextureError::NotCached(id))?;
        if entry.image.dimensions() == (width, height) {
            return Ok(&entry.image);
        }

        if !entry.resized.contains_key(&(width, height)) {
            let resized = imageops::resize(&entry.image, width, height, FilterType::Triangle);
            entry.resized.insert((width, height), resized);
            self.resizes += 1;
        }
        entry
            .resized
            .get(&(width, height))
            .ok_or(TextureError::NotCached(id))
    }

    /// Total resizes performed by this cache.
    pub fn resize_count(&self) -> usize {
        self.resizes
    }

    /// Image of texture `id` at the given size, if cached (see
    /// [`resized_alpha`](Self::resized_alpha)).
    pub fn image_at(&self, id: i64, width: u32, height: u32) -> Option<&RgbaImage> {
        let entry = self.entries.get(&id)?;
        if entry.image.dimensions() == (width, height) {
            Some(&entry.image)
        } else {
            entry.resized.get(&(width, height))
        }
    }

    /// Textures loaded but never consumed by a sprite, sorted by id.
    pub fn leftovers(&self) -> Vec<(i64, &CachedTexture)> {
        let mut unused: Vec<(i64, &CachedTexture)> = self
            .entries
            .iter()
            .filter(|(_, t)| !t.used)
            .map(|(id, t)| (*id, t))
            .collect();
        unused.sort_by_key(|(id, _)| *id);
        unused
    }
}
