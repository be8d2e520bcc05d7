//! Core library for the track analyzer.
//!
//! A job decodes one audio file, extracts tempo, key, loudness, spectral
//! shape, visual reductions and structural cue points, and stores the
//! resulting record in a shared key-value store. Failures are written back to
//! the job's status record and announced on an error channel. Each module
//! owns one stage; [`pipeline::Pipeline`] strings them together.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod timeline;
pub mod visual;

pub use analysis::{AnalysisEngine, TrackFeatures, PROGRESS_TARGET};
pub use audio::{AudioBuffer, Decoder, SymphoniaDecoder};
pub use config::{AnalyzerConfig, Invocation};
pub use error::{AnalyzerError, ErrorKind, Result};
pub use pipeline::{fail_job, report_failure, Outcome, Pipeline};
pub use record::AnalysisResult;
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use timeline::CuePoint;
