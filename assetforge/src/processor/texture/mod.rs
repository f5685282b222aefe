//! Sprite reconstruction from packed texture atlases.
//!
//! For every sprite record the processor:
//!
//! 1. loads the backing color texture into the container's [`TextureCache`]
//! 2. resolves an alpha texture: the sprite's explicit reference, else a
//!    sibling named `<color>[alpha]` / `<color>a`, else none
//! 3. cuts the covering pixel rectangle, merging alpha from the alpha
//!    texture's red channel (resized once per target size when needed)
//! 4. undoes the packing rotation/flip and writes `<sprite>.png`
//!
//! Textures that were loaded but never used by a sprite are written as
//! standalone images when the container completes.

mod alpha;
mod cache;
mod compose;
mod decode;
mod settings;

use std::path::{Path, PathBuf};

use image::{imageops, ImageFormat, RgbaImage};
use thiserror::Error;

use super::{BundleContext, BundleOutcome, BundleState, ProcessorError, ProcessorResult, RecordProcessor};
use crate::bundle::{ContainerError, RecordInfo, RecordKind, SpriteRect, TextureFormat};

pub use alpha::find_alpha_texture;
pub use cache::{CachedTexture, TextureCache};
pub use compose::{compose, PixelRect};
pub use decode::decode_texture;
pub use settings::{SpriteRotation, SpriteSettings};

/// Errors raised while reconstructing one sprite or texture.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("texture '{name}' uses unsupported pixel format {format:?}")]
    UnsupportedFormat { name: String, format: TextureFormat },

    #[error("texture '{name}' payload is {actual} bytes, expected {expected}")]
    BadPayload {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("sprite '{0}' has no backing texture")]
    NoTexture(String),

    #[error("sprite '{name}' uses downscale {downscale}, rescaling is not supported")]
    Downscaled { name: String, downscale: f32 },

    #[error("unknown sprite rotation {0}")]
    UnknownRotation(u32),

    #[error("invalid sprite rectangle {0:?}")]
    InvalidRect(SpriteRect),

    #[error("rectangle {rect:?} exceeds {width}x{height} texture")]
    RectOutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("texture {0} is not cached")]
    NotCached(i64),

    #[error("failed to write {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Processor key `image`.
#[derive(Debug, Default)]
pub struct TextureProcessor;

impl TextureProcessor {
    pub fn new() -> Self {
        Self
    }

    fn process_sprite(
        &self,
        ctx: &BundleContext<'_>,
        record: &RecordInfo,
        cache: &mut TextureCache,
    ) -> Result<(), TextureError> {
        let container = ctx.container;
        let sprite = container.sprite(record.id)?;

        let color_id = sprite
            .texture
            .filter(|id| *id != 0)
            .ok_or_else(|| TextureError::NoTexture(sprite.name.clone()))?;

        if sprite.downscale != 1.0 {
            return Err(TextureError::Downscaled {
                name: sprite.name,
                downscale: sprite.downscale,
            });
        }
        let rotation = SpriteSettings::from_raw(sprite.settings_raw).rotation()?;
        let rect = PixelRect::covering(sprite.rect)?;

        let (width, height) = cache.resolve(container, color_id)?.dimensions();

        let alpha_id = match sprite.alpha_texture.filter(|id| *id != 0) {
            Some(id) => Some(id),
            None => {
                let color_info = container.texture_info(color_id)?;
                find_alpha_texture(container, &color_info)
            }
        };
        if let Some(alpha_id) = alpha_id {
            cache.resolve(container, alpha_id)?;
            cache.resized_alpha(alpha_id, width, height)?;
        }

        let color = &cache.get(color_id).ok_or(TextureError::NotCached(color_id))?.image;
        let alpha = alpha_id
            .map(|id| cache.image_at(id, width, height).ok_or(TextureError::NotCached(id)))
            .transpose()?;

        let composed = compose(color, alpha, rect)?;
        let image = rotation.restore(composed);
        save_png(&image, &ctx.output_file(&sprite.name, "png"))?;

        tracing::trace!(
            container = %ctx.relative_path.display(),
            sprite = %sprite.name,
            alpha = alpha_id.is_some(),
            "Sprite reconstructed"
        );
        Ok(())
    }

    fn flush_leftovers(&self, ctx: &BundleContext<'_>, cache: &TextureCache) -> Result<usize, TextureError> {
        let mut first_error = None;
        let mut written = 0;

        for (id, texture) in cache.leftovers() {
            let mut image = texture.image.clone();
            imageops::flip_vertical_in_place(&mut image);
            let name = format!("{}.{}", texture.name, hex_id(id));
            match save_png(&image, &ctx.output_file(&name, "png")) {
                Ok(()) => written += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

impl RecordProcessor for TextureProcessor {
    fn key(&self) -> &'static str {
        "image"
    }

    fn description(&self) -> &'static str {
        "Textures (every sprite, and textures not used by any sprite)"
    }

    fn enter_bundle(&self, _ctx: &BundleContext<'_>) -> BundleState {
        BundleState::Textures(TextureCache::new())
    }

    fn process(
        &self,
        ctx: &BundleContext<'_>,
        record: &RecordInfo,
        state: &mut BundleState,
    ) -> ProcessorResult<()> {
        let BundleState::Textures(cache) = state else {
            return Ok(());
        };

        match record.kind {
            RecordKind::Texture => {
                cache.load(ctx.container, record.id)?;
                Ok(())
            }
            RecordKind::Sprite => Ok(self.process_sprite(ctx, record, cache)?),
            _ => Ok(()),
        }
    }

    fn exit_bundle(
        &self,
        ctx: &BundleContext<'_>,
        state: BundleState,
        outcome: BundleOutcome,
    ) -> ProcessorResult<()> {
        let BundleState::Textures(cache) = state else {
            return Ok(());
        };
        if outcome == BundleOutcome::Interrupted {
            return Ok(());
        }

        let written = self.flush_leftovers(ctx, &cache).map_err(ProcessorError::from)?;
        if written > 0 {
            tracing::debug!(
                container = %ctx.relative_path.display(),
                textures = written,
                "Wrote unused textures"
            );
        }
        Ok(())
    }
}

/// Hex of the id's little-endian bytes, e.g. `1` → `0100000000000000`.
fn hex_id(id: i64) -> String {
    id.to_le_bytes().iter().map(|b| format!("{:02X}", b)).collect()
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<(), TextureError> {
    let encode_failed = |reason: String| TextureError::Encode {
        path: path.to_path_buf(),
        reason,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| encode_failed(e.to_string()))?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| encode_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{
        Container, ContainerReader, PackedBundleWriter, PackedReader, SpriteData,
    };
    use image::Rgba;
    use tempfile::TempDir;

    /// 8x6 Rgba32 atlas whose pixel (x, y) is (x, y, 50, 255).
    fn coord_atlas() -> Vec<u8> {
        let mut data = Vec::new();
        for y in 0..6u8 {
            for x in 0..8u8 {
                data.extend_from_slice(&[x, y, 50, 255]);
            }
        }
        data
    }

    fn sprite(name: &str, rect: SpriteRect, rotation: u32) -> SpriteData {
        SpriteData {
            name: name.to_string(),
            texture: Some(1),
            alpha_texture: None,
            rect,
            downscale: 1.0,
            settings_raw: rotation << 2,
        }
    }

    struct Fixture {
        temp: TempDir,
        container: Box<dyn Container>,
    }

    impl Fixture {
        fn new(writer: &PackedBundleWriter) -> Self {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("ui/atlas.ab");
            writer.write_to(&path).unwrap();
            let container = PackedReader::new().open(&path).unwrap();
            Self { temp, container }
        }

        fn ctx(&self) -> BundleContext<'_> {
            BundleContext {
                container: self.container.as_ref(),
                relative_path: Path::new("ui/atlas.ab"),
                output_dir: self.temp.path().join("out/ui/atlas"),
            }
        }

        /// Run the texture processor over the whole container.
        fn run(&self) -> Vec<ProcessorResult<()>> {
            let processor = TextureProcessor::new();
            let ctx = self.ctx();
            let mut state = processor.enter_bundle(&ctx);
            let results = self
                .container
                .records()
                .iter()
                .map(|r| processor.process(&ctx, r, &mut state))
                .collect();
            processor
                .exit_bundle(&ctx, state, BundleOutcome::Completed)
                .unwrap();
            results
        }

        fn output(&self, file: &str) -> RgbaImage {
            image::open(self.temp.path().join("out/ui/atlas").join(file))
                .unwrap()
                .to_rgba8()
        }
    }

    #[test]
    fn test_rotate90_matches_analytic_rotation() {
        let rects = [
            SpriteRect::new(0.0, 0.0, 3.0, 2.0),
            SpriteRect::new(2.0, 1.0, 4.0, 3.0),
            SpriteRect::new(5.0, 3.0, 3.0, 3.0),
        ];

        for (i, rect) in rects.iter().enumerate() {
            let mut writer = PackedBundleWriter::new();
            writer
                .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
                .sprite(2, sprite(&format!("s{}", i), *rect, 4));
            let fixture = Fixture::new(&writer);
            assert!(fixture.run().iter().all(|r| r.is_ok()));

            let out = fixture.output(&format!("s{}.png", i));
            let (w, h) = (rect.width as u32, rect.height as u32);
            assert_eq!(out.dimensions(), (h, w));

            // rotate 90° clockwise, then flip rows:
            // out(x, y) = src(rx + w - 1 - y, ry + h - 1 - x)
            for y in 0..w {
                for x in 0..h {
                    let sx = rect.x as u32 + w - 1 - y;
                    let sy = rect.y as u32 + h - 1 - x;
                    assert_eq!(
                        out.get_pixel(x, y),
                        &Rgba([sx as u8, sy as u8, 50, 255]),
                        "rect {:?} at ({}, {})",
                        rect,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_no_rotation_flips_rows() {
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
            .sprite(2, sprite("plain", SpriteRect::new(1.0, 2.0, 2.0, 3.0), 0));
        let fixture = Fixture::new(&writer);
        fixture.run();

        let out = fixture.output("plain.png");
        assert_eq!(out.dimensions(), (2, 3));
        // top row of the output is the highest source row
        assert_eq!(out.get_pixel(0, 0), &Rgba([1, 4, 50, 255]));
        assert_eq!(out.get_pixel(1, 2), &Rgba([2, 2, 50, 255]));
    }

    #[test]
    fn test_heuristic_alpha_resized_once() {
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
            .texture(3, "atlas[alpha]", 4, 3, TextureFormat::Rgb24, vec![128; 4 * 3 * 3])
            .sprite(4, sprite("a", SpriteRect::new(0.0, 0.0, 2.0, 2.0), 0))
            .sprite(5, sprite("b", SpriteRect::new(2.0, 2.0, 2.0, 2.0), 0));
        let fixture = Fixture::new(&writer);

        let processor = TextureProcessor::new();
        let ctx = fixture.ctx();
        let mut state = processor.enter_bundle(&ctx);
        for record in fixture.container.records() {
            processor.process(&ctx, record, &mut state).unwrap();
        }

        let BundleState::Textures(cache) = &state else {
            panic!("texture processor keeps a texture cache");
        };
        assert_eq!(cache.resize_count(), 1);
        assert_eq!(cache.get(3).unwrap().resized_len(), 1);
        assert!(cache.leftovers().is_empty());

        processor
            .exit_bundle(&ctx, state, BundleOutcome::Completed)
            .unwrap();
        let out = fixture.output("a.png");
        assert_eq!(out.get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn test_explicit_alpha_takes_precedence() {
        let mut s = sprite("s", SpriteRect::new(0.0, 0.0, 1.0, 1.0), 0);
        s.alpha_texture = Some(7);
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
            .texture(3, "atlasa", 8, 6, TextureFormat::Alpha8, vec![0; 48])
            .texture(7, "mask", 8, 6, TextureFormat::Rgb24, vec![33; 8 * 6 * 3])
            .sprite(2, s);
        let fixture = Fixture::new(&writer);
        fixture.run();

        assert_eq!(fixture.output("s.png").get_pixel(0, 0)[3], 33);
        // the heuristic candidate was never consumed, so it is flushed
        let leftover = fixture.temp.path().join("out/ui/atlas/atlasa.0300000000000000.png");
        assert!(leftover.is_file());
    }

    #[test]
    fn test_leftover_texture_written_flipped() {
        let mut writer = PackedBundleWriter::new();
        writer.texture(
            1,
            "lone",
            1,
            2,
            TextureFormat::Rgba32,
            vec![10, 0, 0, 255, 20, 0, 0, 255],
        );
        let fixture = Fixture::new(&writer);
        fixture.run();

        let out = fixture.output("lone.0100000000000000.png");
        assert_eq!(out.get_pixel(0, 0)[0], 20);
        assert_eq!(out.get_pixel(0, 1)[0], 10);
    }

    #[test]
    fn test_interrupted_bundle_skips_leftovers() {
        let mut writer = PackedBundleWriter::new();
        writer.texture(1, "lone", 1, 1, TextureFormat::Rgba32, vec![0; 4]);
        let fixture = Fixture::new(&writer);

        let processor = TextureProcessor::new();
        let ctx = fixture.ctx();
        let mut state = processor.enter_bundle(&ctx);
        for record in fixture.container.records() {
            processor.process(&ctx, record, &mut state).unwrap();
        }
        processor
            .exit_bundle(&ctx, state, BundleOutcome::Interrupted)
            .unwrap();
        assert!(!fixture.temp.path().join("out").exists());
    }

    #[test]
    fn test_downscaled_sprite_reported_and_skipped() {
        let mut s = sprite("small", SpriteRect::new(0.0, 0.0, 2.0, 2.0), 0);
        s.downscale = 0.5;
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
            .sprite(2, s);
        let fixture = Fixture::new(&writer);

        let results = fixture.run();
        assert!(matches!(
            results[1],
            Err(ProcessorError::Texture(TextureError::Downscaled { .. }))
        ));
        assert!(!fixture.temp.path().join("out/ui/atlas/small.png").exists());
    }

    #[test]
    fn test_unsupported_format_skipped() {
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "etc", 4, 4, TextureFormat::Other(34), vec![0; 8])
            .sprite(2, sprite("s", SpriteRect::new(0.0, 0.0, 1.0, 1.0), 0))
            .texture(3, "ok", 1, 1, TextureFormat::Rgba32, vec![1, 2, 3, 4]);
        let fixture = Fixture::new(&writer);

        let results = fixture.run();
        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(fixture
            .temp
            .path()
            .join("out/ui/atlas/ok.0300000000000000.png")
            .is_file());
    }

    #[test]
    fn test_out_of_bounds_rect_is_error() {
        let mut writer = PackedBundleWriter::new();
        writer
            .texture(1, "atlas", 8, 6, TextureFormat::Rgba32, coord_atlas())
            .sprite(2, sprite("wide", SpriteRect::new(6.0, 0.0, 4.0, 1.0), 0));
        let fixture = Fixture::new(&writer);

        let results = fixture.run();
        assert!(matches!(
            results[1],
            Err(ProcessorError::Texture(TextureError::RectOutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_hex_id_little_endian() {
        assert_eq!(hex_id(1), "0100000000000000");
        assert_eq!(hex_id(0x0A0B), "0B0A000000000000");
        assert_eq!(hex_id(-1), "FFFFFFFFFFFFFFFF");
    }
}
