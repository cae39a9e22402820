//! Severity ranking and color scales.
//!
//! Partition cluster ids are arbitrary, so display color is decoupled from
//! the numeric id: clusters are ranked by mean unscaled severity and colored
//! along a fixed ordinal scale. Incident dots prefer the categorical
//! criticality mapping; rank-based coloring is the fallback visualization.

use std::collections::HashMap;

use crate::cluster::ClusterAssignment;
use crate::normalize::NormalizedRecord;
use crate::Criticality;

/// Ordinal color scale, lowest severity rank first.
pub const SEVERITY_SCALE: [&str; 3] = ["green", "orange", "red"];

/// Reserved for density-noise points; overrides any severity color.
pub const NOISE_COLOR: &str = "gray";

/// Neutral color for raw, uncolored views.
pub const RAW_COLOR: &str = "blue";

/// Rank partition clusters by mean unscaled severity and color them along
/// [`SEVERITY_SCALE`].
///
/// The lowest-mean cluster maps to the first scale entry, the next to the
/// second, and so on; past the end of the scale the color saturates at the
/// last entry. Ties in mean severity break on the numeric cluster id, so
/// the mapping is deterministic.
pub fn rank_partition_colors(
    records: &[NormalizedRecord],
    assignments: &[ClusterAssignment],
) -> HashMap<usize, &'static str> {
    let mut totals: HashMap<usize, (f64, usize)> = HashMap::new();
    for (record, assignment) in records.iter().zip(assignments) {
        let entry = totals.entry(assignment.partition).or_insert((0.0, 0));
        entry.0 += record.severity();
        entry.1 += 1;
    }

    let mut means: Vec<(usize, f64)> = totals
        .into_iter()
        .map(|(id, (sum, count))| (id, sum / count as f64))
        .collect();
    means.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    means
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| {
            (id, SEVERITY_SCALE[rank.min(SEVERITY_SCALE.len() - 1)])
        })
        .collect()
}

/// Color for an incident's criticality label; unknown labels render neutral.
pub fn criticality_color(criticality: Option<Criticality>) -> &'static str {
    match criticality {
        Some(Criticality::Minor) => "yellow",
        Some(Criticality::Moderate) => "orange",
        Some(Criticality::Major) => "red",
        None => RAW_COLOR,
    }
}
