//! Known/unknown classification of a match result.

use crate::identity::{identity_from_path, LabelError};
use crate::types::MatchResult;

/// Distance above which a face counts as unknown.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Known,
    Unknown,
}

/// Outcome for one face: the verdict and the label to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub label: String,
}

/// Classify a match against `threshold`.
///
/// A distance strictly greater than the threshold is unknown and labelled
/// `Unknown <timestamp>`. Anything else keeps the identity name with the
/// distance to three decimals.
pub fn classify(result: &MatchResult, threshold: f32, timestamp: &str) -> Result<Decision, LabelError> {
    if result.distance > threshold {
        return Ok(Decision {
            verdict: Verdict::Unknown,
            label: format!("Unknown {timestamp}"),
        });
    }

    let identity = identity_from_path(&result.identity_path)?;
    Ok(Decision {
        verdict: Verdict::Known,
        label: format!("{identity} Similarity_Distance:{:.3}", result.distance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: &str, distance: f32) -> MatchResult {
        MatchResult { identity_path: path.into(), distance }
    }

    #[test]
    fn test_known_label() {
        let d = classify(&result("train/alice/1.jpg", 0.15), 0.2, "12:00:00").unwrap();
        assert_eq!(d.verdict, Verdict::Known);
        assert_eq!(d.label, "alice Similarity_Distance:0.150");
    }

    #[test]
    fn test_unknown_label() {
        let d = classify(&result("train/alice/1.jpg", 0.35), 0.2, "12:34:56").unwrap();
        assert_eq!(d.verdict, Verdict::Unknown);
        assert_eq!(d.label, "Unknown 12:34:56");
    }

    #[test]
    fn test_threshold_boundary_is_known() {
        let d = classify(&result("train/bob/a.jpg", 0.2), 0.2, "00:00:00").unwrap();
        assert_eq!(d.verdict, Verdict::Known);
        assert_eq!(d.label, "bob Similarity_Distance:0.200");

        let d = classify(&result("train/bob/a.jpg", 0.2001), 0.2, "00:00:00").unwrap();
        assert_eq!(d.verdict, Verdict::Unknown);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let d = classify(&result("train/bob/a.jpg", 0.35), 0.4, "00:00:00").unwrap();
        assert_eq!(d.verdict, Verdict::Known);
    }

    #[test]
    fn test_known_with_malformed_path_errors() {
        let err = classify(&result("nopath", 0.1), 0.2, "00:00:00").unwrap_err();
        assert_eq!(err, LabelError::MalformedIdentityPath("nopath".into()));
    }

    #[test]
    fn test_unknown_does_not_need_identity() {
        let d = classify(&result("nopath", 0.9), 0.2, "01:02:03").unwrap();
        assert_eq!(d.verdict, Verdict::Unknown);
    }
}
