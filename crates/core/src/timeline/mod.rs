use serde::{Deserialize, Serialize};

use crate::visual::every_kth;

/// Section names assigned to boundaries in order. Boundaries past the end of
/// the list reuse the last name.
pub const SECTION_LABELS: [&str; 7] = [
    "Intro", "Verse 1", "Chorus", "Verse 2", "Bridge", "Chorus", "Outro",
];

/// Labelled timestamp marking a structural section boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePoint {
    pub time: f64,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CuePoint {
    /// Builds a cue whose kind is the lower-cased first word of `label`.
    pub fn new(time: f64, label: impl Into<String>) -> Self {
        let label = label.into();
        let kind = label
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        Self { time, label, kind }
    }
}

/// Sorts the boundaries, reduces them to at most `max_cues` with the shared
/// every-k-th rule and labels them by position.
pub fn label_boundaries(boundaries: &[f64], max_cues: usize) -> Vec<CuePoint> {
    let mut sorted = boundaries.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    every_kth(&sorted, max_cues)
        .into_iter()
        .enumerate()
        .map(|(index, time)| {
            let label = SECTION_LABELS[index.min(SECTION_LABELS.len() - 1)];
            CuePoint::new(time, label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_first_word_lowercased() {
        assert_eq!(CuePoint::new(0.0, "Verse 1").kind, "verse");
        assert_eq!(CuePoint::new(0.0, "Intro").kind, "intro");
        assert_eq!(CuePoint::new(0.0, "").kind, "");
    }

    #[test]
    fn labels_cycle_then_clamp_to_outro() {
        let boundaries: Vec<f64> = (0..10).map(|i| i as f64 * 10.0).collect();
        let cues = label_boundaries(&boundaries, 10);
        let labels: Vec<&str> = cues.iter().map(|cue| cue.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Intro", "Verse 1", "Chorus", "Verse 2", "Bridge", "Chorus", "Outro", "Outro",
                "Outro", "Outro"
            ]
        );
    }

    #[test]
    fn reduces_to_limit_and_stays_ordered() {
        let boundaries: Vec<f64> = (0..37).rev().map(|i| i as f64 * 2.5).collect();
        let cues = label_boundaries(&boundaries, 10);
        assert_eq!(cues.len(), 10);
        assert!(cues.windows(2).all(|pair| pair[0].time <= pair[1].time));
        assert_eq!(cues[0].time, 0.0);
        assert_eq!(cues[1].time, 7.5);
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(CuePoint::new(12.5, "Chorus")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "time": 12.5, "label": "Chorus", "type": "chorus" })
        );
    }
}
