use std::{fs::File, path::Path};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{AnalyzerError, Result};

/// Fully materialised mono recording at its native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    /// Channel count of the source before the mono downmix.
    source_channels: u16,
}

impl AudioBuffer {
    /// Wraps already-decoded mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::with_source_channels(samples, sample_rate, 1)
    }

    pub fn with_source_channels(
        samples: Vec<f32>,
        sample_rate: u32,
        source_channels: u16,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AnalyzerError::InvalidInput("sample rate must be non-zero"));
        }
        if samples.is_empty() {
            return Err(AnalyzerError::InvalidInput(
                "audio buffer requires at least one sample",
            ));
        }

        Ok(Self {
            samples,
            sample_rate,
            source_channels: source_channels.max(1),
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count divided by sample rate.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Loads an audio file into an [`AudioBuffer`]. Every analysis stage consumes
/// the output of a single decoder so that all of them see identical samples.
pub trait Decoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer>;
}

/// Decoder backed by symphonia's default format and codec registries.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let file = File::open(path).map_err(|err| {
            AnalyzerError::decode(format!("cannot open {}: {err}", path.display()))
        })?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| {
                AnalyzerError::decode(format!(
                    "unrecognised audio container {}: {err}",
                    path.display()
                ))
            })?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AnalyzerError::decode("no decodable audio track"))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|err| AnalyzerError::decode(format!("unsupported codec: {err}")))?;

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => return Err(err.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    tracing::debug!(error = err, "skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(err) => return Err(err.into()),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count();

            let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            interleaved.copy_interleaved_ref(decoded);
            downmix_into(interleaved.samples(), channels, &mut mono);
        }

        if mono.is_empty() {
            return Err(AnalyzerError::decode(format!(
                "no audio samples decoded from {}",
                path.display()
            )));
        }
        if sample_rate == 0 {
            return Err(AnalyzerError::decode("stream does not declare a sample rate"));
        }

        tracing::debug!(
            path = %path.display(),
            samples = mono.len(),
            sample_rate,
            channels,
            "decoded audio"
        );

        let source_channels = u16::try_from(channels).unwrap_or(u16::MAX);
        AudioBuffer::with_source_channels(mono, sample_rate, source_channels)
    }
}

/// Averages interleaved frames into mono samples.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }

    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
