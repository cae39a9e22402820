//! Record normalization and per-batch feature scaling.
//!
//! Each record is reduced to three clustering features (latitude, longitude
//! and the scalar severity metric), and each feature is independently min-max
//! scaled into [0, 1] over the whole batch. The original coordinates stay on
//! the record untouched so the view layer can render unscaled positions.
//!
//! Scaling parameters are computed once per batch and frozen; they are never
//! reused for a later batch.

use crate::RawRecord;

/// Number of clustering features per record: lat, lng, severity.
pub const FEATURES: usize = 3;

/// Frozen per-batch min/max for each clustering feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingParams {
    mins: [f64; FEATURES],
    maxs: [f64; FEATURES],
}

impl ScalingParams {
    /// Fit scaling parameters over a batch of feature rows.
    ///
    /// Returns `None` for an empty batch.
    pub fn fit(rows: &[[f64; FEATURES]]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let mut mins = [f64::MAX; FEATURES];
        let mut maxs = [f64::MIN; FEATURES];
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                mins[i] = mins[i].min(*value);
                maxs[i] = maxs[i].max(*value);
            }
        }
        Some(Self { mins, maxs })
    }

    /// Scale one feature row into [0, 1] per feature.
    ///
    /// A feature that is constant across the batch (min == max) scales to
    /// exactly 0.0, which keeps a degenerate batch out of the divide.
    pub fn apply(&self, row: [f64; FEATURES]) -> [f64; FEATURES] {
        let mut scaled = [0.0; FEATURES];
        for i in 0..FEATURES {
            let span = self.maxs[i] - self.mins[i];
            if span > 0.0 {
                scaled[i] = (row[i] - self.mins[i]) / span;
            }
        }
        scaled
    }
}

/// A raw record together with its scaled clustering features.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub raw: RawRecord,
    /// (lat', lng', severity'), each in [0, 1].
    pub scaled: [f64; FEATURES],
}

impl NormalizedRecord {
    /// The two spatial features (lat', lng').
    pub fn spatial_features(&self) -> [f64; 2] {
        [self.scaled[0], self.scaled[1]]
    }

    /// Unscaled severity of the underlying record.
    pub fn severity(&self) -> f64 {
        self.raw.severity()
    }
}

fn feature_row(record: &RawRecord) -> [f64; FEATURES] {
    [record.position.lat, record.position.lng, record.severity()]
}

/// Normalize a batch of raw records.
///
/// Pure transform: an empty input yields an empty output, never an error.
pub fn normalize_batch(records: Vec<RawRecord>) -> Vec<NormalizedRecord> {
    let rows: Vec<[f64; FEATURES]> = records.iter().map(feature_row).collect();
    let Some(params) = ScalingParams::fit(&rows) else {
        return Vec::new();
    };

    records
        .into_iter()
        .zip(rows)
        .map(|(raw, row)| NormalizedRecord {
            raw,
            scaled: params.apply(row),
        })
        .collect()
}
