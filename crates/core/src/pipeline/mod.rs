//! One analysis job from file path to stored result or recorded failure.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    analysis::{progress, AnalysisEngine},
    config::{AnalyzerConfig, Invocation},
    record::{self, AnalysisResult},
    store::{analysis_key, job_key, KeyValueStore, JOB_ERROR_CHANNEL},
    AnalyzerError, Decoder, ErrorKind, Result,
};

/// Final state of a job. Exactly one of these is reached per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Persisted(AnalysisResult),
    Failed { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Persisted(_))
    }

    /// `0` once the result is stored, `1` for any failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Persisted(_) => 0,
            Outcome::Failed { .. } => 1,
        }
    }
}

pub struct Pipeline<D> {
    engine: AnalysisEngine,
    decoder: D,
}

impl<D: Decoder> Pipeline<D> {
    pub fn new(config: AnalyzerConfig, decoder: D) -> Self {
        Self {
            engine: AnalysisEngine::new(config),
            decoder,
        }
    }

    /// Decodes and analyses `path` without touching any store.
    pub fn analyze(&self, path: &Path, track_id: &str) -> Result<AnalysisResult> {
        tracing::info!(path = %path.display(), track_id, "starting analysis");
        progress(5);

        let buffer = self.decoder.decode(path)?;
        tracing::debug!(
            samples = buffer.len(),
            sample_rate = buffer.sample_rate(),
            channels = buffer.source_channels(),
            "decoded"
        );
        progress(15);

        let features = self.engine.run(&buffer)?;
        let result = record::assemble(track_id, &features, Utc::now());
        progress(95);
        Ok(result)
    }

    /// Analyses and persists one track. On failure the job record is moved to
    /// the error state on a best-effort basis; the returned outcome does not
    /// depend on whether that report succeeded.
    pub fn run(&self, invocation: &Invocation, store: &mut dyn KeyValueStore) -> Outcome {
        let attempt = self
            .analyze(&invocation.audio_path, &invocation.track_id)
            .and_then(|result| {
                persist(store, &result)?;
                Ok(result)
            });

        match attempt {
            Ok(result) => {
                progress(100);
                tracing::info!(track_id = %result.track_id, "analysis stored");
                Outcome::Persisted(result)
            }
            Err(err) => fail_job(store, &invocation.job_id, err),
        }
    }
}

/// Logs `err`, records it on the job and turns it into a failed outcome.
/// Also used for failures that happen before a pipeline exists, such as an
/// unreadable configuration file.
pub fn fail_job(store: &mut dyn KeyValueStore, job_id: &str, err: AnalyzerError) -> Outcome {
    let kind = err.kind();
    let message = err.to_string();
    tracing::error!(%kind, job_id, "{message}");

    if let Err(report_err) = report_failure(store, job_id, &message, Utc::now()) {
        tracing::warn!(job_id, error = %report_err, "could not record job failure");
    }
    Outcome::Failed { kind, message }
}

fn persist(store: &mut dyn KeyValueStore, result: &AnalysisResult) -> Result<()> {
    let json = serde_json::to_string(result)?;
    store.set(&analysis_key(&result.track_id), &json)
}

/// Marks the job record as failed and publishes it on the error channel.
///
/// The record is owned by whoever scheduled the job; only `status`, `error`
/// and `completedAt` are overwritten. A missing record or one that is not a
/// JSON object is reported as a store error.
pub fn report_failure(
    store: &mut dyn KeyValueStore,
    job_id: &str,
    message: &str,
    completed_at: DateTime<Utc>,
) -> Result<()> {
    let key = job_key(job_id);
    let existing = store
        .get(&key)?
        .ok_or_else(|| AnalyzerError::store(format!("job record {key} does not exist")))?;

    let mut job: Value = serde_json::from_str(&existing)?;
    let fields = job
        .as_object_mut()
        .ok_or_else(|| AnalyzerError::store(format!("job record {key} is not a JSON object")))?;
    fields.insert("status".to_string(), Value::from("error"));
    fields.insert("error".to_string(), Value::from(message));
    fields.insert(
        "completedAt".to_string(),
        Value::from(record::timestamp(completed_at)),
    );

    let payload = serde_json::to_string(&job)?;
    store.set(&key, &payload)?;
    store.publish(JOB_ERROR_CHANNEL, &payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::{store::MemoryStore, AudioBuffer};

    struct SineDecoder;

    impl Decoder for SineDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioBuffer> {
            let samples = (0..22_050 * 3)
                .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f64 / 22_050.0).sin() as f32)
                .collect();
            AudioBuffer::new(samples, 22_050)
        }
    }

    struct BrokenDecoder;

    impl Decoder for BrokenDecoder {
        fn decode(&self, path: &Path) -> Result<AudioBuffer> {
            Err(AnalyzerError::decode(format!("{} is corrupt", path.display())))
        }
    }

    /// Reads succeed, every write is refused.
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: MemoryStore,
    }

    impl KeyValueStore for ReadOnlyStore {
        fn get(&mut self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(AnalyzerError::store("READONLY"))
        }

        fn publish(&mut self, _channel: &str, _message: &str) -> Result<()> {
            Err(AnalyzerError::store("READONLY"))
        }
    }

    fn invocation() -> Invocation {
        Invocation::new("song.wav", "track-1", "job-1", "redis://localhost")
    }

    fn completed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn success_persists_only_the_analysis() {
        let mut store = MemoryStore::new();
        store.insert(job_key("job-1"), r#"{"status":"processing"}"#);

        let outcome = Pipeline::new(AnalyzerConfig::default(), SineDecoder)
            .run(&invocation(), &mut store);

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        assert!(store.contains_key("track:track-1:analysis"));
        assert_eq!(store.value("analysis:job:job-1"), Some(r#"{"status":"processing"}"#));
        assert!(store.published().is_empty());
    }

    #[test]
    fn decode_failure_records_the_error() {
        let mut store = MemoryStore::new();
        store.insert(job_key("job-1"), r#"{"status":"processing","trackId":"track-1"}"#);

        let outcome = Pipeline::new(AnalyzerConfig::default(), BrokenDecoder)
            .run(&invocation(), &mut store);

        let Outcome::Failed { kind, message } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*kind, ErrorKind::Decode);
        assert!(message.contains("corrupt"));
        assert_eq!(outcome.exit_code(), 1);
        assert!(!store.contains_key("track:track-1:analysis"));

        let record: Value =
            serde_json::from_str(store.value("analysis:job:job-1").unwrap()).unwrap();
        assert_eq!(record["status"], "error");
        assert_eq!(record["trackId"], "track-1");
        assert_eq!(record["error"], message.as_str());
        assert_eq!(store.published().len(), 1);
        assert_eq!(store.published()[0].0, JOB_ERROR_CHANNEL);
        assert_eq!(
            serde_json::from_str::<Value>(&store.published()[0].1).unwrap(),
            record
        );
    }

    #[test]
    fn failed_persist_is_a_store_failure() {
        let mut store = ReadOnlyStore::default();
        store.inner.insert(job_key("job-1"), "{}");

        let outcome = Pipeline::new(AnalyzerConfig::default(), SineDecoder)
            .run(&invocation(), &mut store);

        assert!(matches!(
            outcome,
            Outcome::Failed {
                kind: ErrorKind::Store,
                ..
            }
        ));
        assert!(!store.inner.contains_key("track:track-1:analysis"));
    }

    #[test]
    fn configuration_errors_fail_the_job_as_analysis() {
        let mut store = MemoryStore::new();
        store.insert(job_key("job-1"), r#"{"status":"processing"}"#);

        let err = AnalyzerError::Config("segment.block_seconds must be positive".into());
        let outcome = fail_job(&mut store, "job-1", err);

        let Outcome::Failed { kind, message } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*kind, ErrorKind::Analysis);
        assert!(message.contains("block_seconds"));

        let record: Value =
            serde_json::from_str(store.value("analysis:job:job-1").unwrap()).unwrap();
        assert_eq!(record["status"], "error");
        assert_eq!(record["error"], message.as_str());
        assert_eq!(store.published().len(), 1);
    }

    #[test]
    fn report_overwrites_only_status_fields() {
        let mut store = MemoryStore::new();
        store.insert(
            job_key("7"),
            json!({ "status": "processing", "error": null, "progress": 40 }).to_string(),
        );

        report_failure(&mut store, "7", "decode error: boom", completed_at()).unwrap();

        let record: Value = serde_json::from_str(store.value("analysis:job:7").unwrap()).unwrap();
        assert_eq!(
            record,
            json!({
                "status": "error",
                "error": "decode error: boom",
                "completedAt": "2024-05-06T07:08:09Z",
                "progress": 40
            })
        );
    }

    #[test]
    fn report_rejects_missing_and_non_object_records() {
        let mut store = MemoryStore::new();
        let err = report_failure(&mut store, "nope", "x", completed_at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);

        store.insert(job_key("list"), "[1, 2]");
        let err = report_failure(&mut store, "list", "x", completed_at()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(store.published().is_empty());
    }
}
