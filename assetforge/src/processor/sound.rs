//! Audio clip extraction.
//!
//! Codec internals are out of scope: samples are located through the
//! [`SampleExtractor`] trait and written out in whatever standard container
//! they are already stored in.

use super::{write_output, BundleContext, BundleState, ProcessorError, ProcessorResult, RecordProcessor};
use crate::bundle::{AudioClipData, RecordInfo, RecordKind};

/// One playable sample in a standard file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSample {
    /// File extension without the dot, e.g. `ogg`.
    pub extension: &'static str,
    pub data: Vec<u8>,
}

/// Splits an audio bank into samples.
pub trait SampleExtractor: Send + Sync {
    /// Samples in bank order; empty if the bank is not understood.
    fn extract(&self, clip: &AudioClipData) -> Vec<AudioSample>;
}

/// Recognises banks made of concatenated Ogg, RIFF/WAVE or FLAC streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardContainerExtractor;

const OGG_MAGIC: &[u8] = b"OggS";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WAVE_MAGIC: &[u8] = b"WAVE";
const FLAC_MAGIC: &[u8] = b"fLaC";
/// Header type flag of the first page of an Ogg logical stream.
const OGG_BOS: u8 = 0x02;

impl StandardContainerExtractor {
    fn is_ogg_start(data: &[u8]) -> bool {
        data.starts_with(OGG_MAGIC) && data.get(5).is_some_and(|flags| flags & OGG_BOS != 0)
    }

    fn is_wave_start(data: &[u8]) -> bool {
        data.starts_with(RIFF_MAGIC) && data.get(8..12) == Some(WAVE_MAGIC)
    }

    fn is_stream_start(data: &[u8]) -> bool {
        Self::is_ogg_start(data) || Self::is_wave_start(data) || data.starts_with(FLAC_MAGIC)
    }

    /// Next stream start strictly after `from`.
    fn next_stream(data: &[u8], from: usize) -> usize {
        (from + 1..data.len())
            .find(|&i| Self::is_stream_start(&data[i..]))
            .unwrap_or(data.len())
    }
}

impl SampleExtractor for StandardContainerExtractor {
    fn extract(&self, clip: &AudioClipData) -> Vec<AudioSample> {
        let data = clip.data.as_slice();
        let mut samples = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let rest = &data[pos..];
            let (extension, end) = if Self::is_wave_start(rest) {
                let size = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
                ("wav", (pos + size + 8).min(data.len()))
            } else if Self::is_ogg_start(rest) {
                ("ogg", Self::next_stream(data, pos))
            } else if rest.starts_with(FLAC_MAGIC) {
                ("flac", Self::next_stream(data, pos))
            } else {
                break;
            };

            samples.push(AudioSample {
                extension,
                data: data[pos..end].to_vec(),
            });
            pos = end;
        }
        samples
    }
}

/// Processor key `sound`.
pub struct SoundProcessor {
    extractor: Box<dyn SampleExtractor>,
}

impl Default for SoundProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundProcessor {
    pub fn new() -> Self {
        Self::with_extractor(Box::new(StandardContainerExtractor))
    }

    pub fn with_extractor(extractor: Box<dyn SampleExtractor>) -> Self {
        Self { extractor }
    }
}

impl RecordProcessor for SoundProcessor {
    fn key(&self) -> &'static str {
        "sound"
    }

    fn description(&self) -> &'static str {
        "Sounds (audio clips, in their native container format)"
    }

    fn process(
        &self,
        ctx: &BundleContext<'_>,
        record: &RecordInfo,
        _state: &mut BundleState,
    ) -> ProcessorResult<()> {
        if record.kind != RecordKind::AudioClip {
            return Ok(());
        }

        let clip = ctx.container.audio_clip(record.id)?;
        let samples = self.extractor.extract(&clip);
        if samples.is_empty() {
            return Err(ProcessorError::Unsupported(format!(
                "audio clip '{}' is not a recognised sample bank",
                clip.name
            )));
        }

        let single = samples.len() == 1;
        for (i, sample) in samples.iter().enumerate() {
            let stem = if single {
                clip.name.clone()
            } else {
                format!("{}_sample_{}", clip.name, i)
            };
            write_output(&ctx.output_file(&stem, sample.extension), &sample.data)?;
        }
        Ok(())
    }
}
