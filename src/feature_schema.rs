//! The ordered feature schema shared by training and inference.
//!
//! Position in [`FEATURE_NAMES`] is the position in every feature vector.
//! Reordering, adding or removing a feature is a breaking change: bump
//! [`SCHEMA_VERSION`] so that older checkpoints are rejected at load time.

use crate::errors::{MatchError, MatchResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier written into every checkpoint.
pub const SCHEMA_VERSION: &str = "vehicle-match-features/v1";

/// Number of coordinates in a feature vector.
pub const FEATURE_COUNT: usize = 9;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "price_gap",
    "mpg_gap",
    "star_scaled",
    "sentiment_scaled",
    "log_reviews",
    "prefer_new",
    "prefer_used",
    "body_sedan",
    "body_suv",
];

/// Denominator floor for the relative gap features.
pub const GAP_DENOMINATOR_FLOOR: f64 = 1.0;

/// Upper bound of the star rating scale.
pub const MAX_STAR_RATING: f64 = 5.0;

/// Declared range of `avg_sentiment`.
pub const SENTIMENT_RANGE: (f64, f64) = (-1.0, 1.0);

/// Supported body styles, each with a fixed one-hot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyStyle {
    Sedan,
    Suv,
}

impl BodyStyle {
    pub const ALL: [BodyStyle; 2] = [BodyStyle::Sedan, BodyStyle::Suv];

    /// Request/CSV field carrying this style's indicator.
    pub fn field_name(&self) -> &'static str {
        match self {
            BodyStyle::Sedan => "body_sedan",
            BodyStyle::Suv => "body_suv",
        }
    }

    /// Index of this style's indicator in the feature vector.
    pub fn slot(&self) -> usize {
        match self {
            BodyStyle::Sedan => 7,
            BodyStyle::Suv => 8,
        }
    }
}

/// Position of a named feature, if the schema has it.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Owned copy of the feature names, as stored in checkpoints.
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// SHA-256 over the version and ordered names, for logs and metadata.
pub fn schema_fingerprint() -> String {
    let mut hasher = Sha256::new();
    hasher.update(SCHEMA_VERSION.as_bytes());
    for name in FEATURE_NAMES {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Check that a checkpoint's schema metadata matches the active schema.
pub fn check_compatible(version: &str, names: &[String], input_dim: usize) -> MatchResult<()> {
    if input_dim != FEATURE_COUNT {
        return Err(MatchError::schema_mismatch(
            SCHEMA_VERSION,
            format!("checkpoint input_dim is {input_dim}, schema has {FEATURE_COUNT} features"),
        ));
    }

    if version != SCHEMA_VERSION {
        return Err(MatchError::schema_mismatch(
            SCHEMA_VERSION,
            format!("checkpoint was trained against schema '{version}'"),
        ));
    }

    if names.len() != FEATURE_COUNT {
        return Err(MatchError::schema_mismatch(
            SCHEMA_VERSION,
            format!("checkpoint lists {} feature names", names.len()),
        ));
    }

    if let Some((pos, (found, expected))) = names
        .iter()
        .zip(FEATURE_NAMES.iter())
        .enumerate()
        .find(|(_, (found, expected))| found.as_str() != **expected)
    {
        return Err(MatchError::schema_mismatch(
            SCHEMA_VERSION,
            format!("feature {pos} is '{found}', expected '{expected}'"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_style_slots_match_feature_names() {
        for style in BodyStyle::ALL {
            assert_eq!(FEATURE_NAMES[style.slot()], style.field_name());
            assert_eq!(feature_index(style.field_name()), Some(style.slot()));
        }
    }

    #[test]
    fn feature_names_are_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(schema_fingerprint(), schema_fingerprint());
        assert_eq!(schema_fingerprint().len(), 64);
    }

    #[test]
    fn compatible_metadata_passes() {
        assert!(check_compatible(SCHEMA_VERSION, &feature_names(), FEATURE_COUNT).is_ok());
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let err = check_compatible(SCHEMA_VERSION, &feature_names(), 10).unwrap_err();
        assert!(matches!(err, MatchError::SchemaMismatch { .. }));
    }

    #[test]
    fn permuted_names_are_rejected() {
        let mut names = feature_names();
        names.swap(0, 1);
        let err = check_compatible(SCHEMA_VERSION, &names, FEATURE_COUNT).unwrap_err();
        assert!(err.to_string().contains("feature 0 is 'mpg_gap'"));
    }

    #[test]
    fn other_schema_version_is_rejected() {
        let err = check_compatible("vehicle-match-features/v0", &feature_names(), FEATURE_COUNT)
            .unwrap_err();
        assert!(matches!(err, MatchError::SchemaMismatch { .. }));
    }
}
