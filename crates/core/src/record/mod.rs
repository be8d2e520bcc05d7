use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{analysis::TrackFeatures, timeline::CuePoint};

const LOUDNESS_FLOOR: f64 = -70.0;

/// The persisted per-track artifact. Field names match the JSON wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub track_id: String,
    pub analyzed_at: String,
    pub duration: f64,
    pub bpm: u32,
    pub key: String,
    pub key_strength: f32,
    pub loudness: f64,
    pub spectral_centroid: f32,
    pub spectral_contrast: Vec<f32>,
    pub waveform_envelope: Vec<f32>,
    pub frequency_spectrum: Vec<f32>,
    pub cue_points: Vec<CuePoint>,
}

/// Shapes stage output into an [`AnalysisResult`], applying the rounding
/// rules. Non-finite numbers never reach the JSON.
pub fn assemble(
    track_id: &str,
    features: &TrackFeatures,
    analyzed_at: DateTime<Utc>,
) -> AnalysisResult {
    AnalysisResult {
        track_id: track_id.to_string(),
        analyzed_at: timestamp(analyzed_at),
        duration: finite_or(features.duration_seconds, 0.0),
        bpm: round_bpm(features.bpm),
        key: features.key.label(),
        key_strength: finite_or(features.key.strength as f64, 0.0).clamp(0.0, 1.0) as f32,
        loudness: round_loudness(features.loudness_lufs),
        spectral_centroid: finite_or(features.spectral.centroid as f64, 0.0) as f32,
        spectral_contrast: finite_values(&features.spectral.contrast),
        waveform_envelope: finite_values(&features.waveform_envelope),
        frequency_spectrum: finite_values(&features.frequency_spectrum),
        cue_points: features.cue_points.clone(),
    }
}

/// UTC with second precision, e.g. `2024-03-01T12:00:05Z`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn round_bpm(bpm: f32) -> u32 {
    if bpm.is_finite() && bpm > 0.0 {
        bpm.round() as u32
    } else {
        0
    }
}

fn round_loudness(lufs: f32) -> f64 {
    let lufs = finite_or(lufs as f64, LOUDNESS_FLOOR);
    (lufs * 100.0).round() / 100.0
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn finite_values(values: &[f32]) -> Vec<f32> {
    values
        .iter()
        .map(|value| if value.is_finite() { *value } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::analysis::{
        key::{KeyEstimate, Scale},
        spectral::SpectralShape,
    };

    fn features() -> TrackFeatures {
        TrackFeatures {
            duration_seconds: 30.0,
            bpm: 127.6,
            key: KeyEstimate {
                tonic: 9,
                scale: Scale::Minor,
                strength: 0.72,
            },
            loudness_lufs: -9.876,
            spectral: SpectralShape {
                centroid: 1_523.5,
                contrast: vec![12.0, f32::NAN, 8.5],
            },
            waveform_envelope: vec![0.1, 0.2],
            frequency_spectrum: vec![1.0, f32::INFINITY],
            cue_points: vec![CuePoint::new(0.0, "Intro"), CuePoint::new(14.2, "Verse 1")],
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap()
    }

    #[test]
    fn applies_rounding_and_formatting() {
        let result = assemble("track-7", &features(), at());

        assert_eq!(result.track_id, "track-7");
        assert_eq!(result.analyzed_at, "2024-03-01T12:00:05Z");
        assert_eq!(result.bpm, 128);
        assert_eq!(result.key, "A minor");
        assert_eq!(result.loudness, -9.88);
        assert_eq!(result.spectral_contrast, vec![12.0, 0.0, 8.5]);
        assert_eq!(result.frequency_spectrum, vec![1.0, 0.0]);
    }

    #[test]
    fn degenerate_scalars_fall_back() {
        let mut features = features();
        features.bpm = f32::NAN;
        features.loudness_lufs = f32::NEG_INFINITY;
        features.key.strength = 1.5;

        let result = assemble("t", &features, at());
        assert_eq!(result.bpm, 0);
        assert_eq!(result.loudness, -70.0);
        assert_eq!(result.key_strength, 1.0);

        features.bpm = -3.0;
        assert_eq!(assemble("t", &features, at()).bpm, 0);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(assemble("track-7", &features(), at())).unwrap();
        let object = json.as_object().unwrap();

        for field in [
            "trackId",
            "analyzedAt",
            "duration",
            "bpm",
            "key",
            "keyStrength",
            "loudness",
            "spectralCentroid",
            "spectralContrast",
            "waveformEnvelope",
            "frequencySpectrum",
            "cuePoints",
        ] {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert_eq!(object.len(), 12);
        assert_eq!(json["bpm"], 128);
        assert_eq!(json["loudness"], -9.88);
        assert_eq!(json["cuePoints"][1]["type"], "verse");
    }

    #[test]
    fn round_trips_through_json() {
        let result = assemble("track-7", &features(), at());
        let text = serde_json::to_string(&result).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, result);
    }
}
