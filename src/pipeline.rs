//! Batch lifecycle: one fetch cycle runs the whole pipeline and ends in an
//! immutable set of precomputed view artifacts.
//!
//! Stages per batch:
//! 1. Fetched: raw records arrive from the feed client
//! 2. Filtered: incident batches drop records outside the trailing window
//! 3. Normalized: severity derived, features min-max scaled over the batch
//! 4. Clustered: partition and density passes over the same features
//! 5. Colored: partition clusters ranked by mean severity
//! 6. Artifacts built: every view variant cached for O(1) selection
//!
//! The pipeline is synchronous and single-threaded; batches are small
//! (hundreds of points). Nothing in here returns an error for degenerate
//! data; an empty or malformed batch degrades to placeholder artifacts.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::cluster::{
    ClusterAssignment, Dbscan, DensityClusterer, KMeans, PartitionClusterer,
};
use crate::normalize::{normalize_batch, FEATURES};
use crate::rank::rank_partition_colors;
use crate::temporal::filter_recent;
use crate::view::{build_view_set, ViewConfig, ViewSet};
use crate::{DatasetKind, RawRecord};

/// Stages of one batch run, in order. The terminal stage is immutable and
/// serves every view-selection lookup until the next fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Fetched,
    Filtered,
    Normalized,
    Clustered,
    Colored,
    ArtifactsBuilt,
}

fn log_stage(stage: BatchStage) {
    debug!("batch stage: {stage:?}");
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Requested partition count for the k-means pass.
    pub partitions: usize,
    /// RNG seed for deterministic partitioning.
    pub seed: u64,
    /// Density parameters for flow batches, over the two spatial features.
    pub flow_density: Dbscan,
    /// Density parameters for incident batches, over all three features.
    pub incident_density: Dbscan,
    /// Trailing window for incident records, in hours.
    pub incident_window_hours: i64,
    /// View-construction knobs.
    pub view: ViewConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partitions: 3,
            seed: 0,
            flow_density: Dbscan { eps: 0.05, min_samples: 3 },
            incident_density: Dbscan { eps: 0.1, min_samples: 3 },
            incident_window_hours: 24,
            view: ViewConfig::default(),
        }
    }
}

/// Run the full pipeline over one fetched batch.
///
/// `now` is the reference instant for the incident window; pass
/// [`Utc::now`] for live data.
pub fn prepare_views(
    dataset: DatasetKind,
    records: Vec<RawRecord>,
    now: DateTime<Utc>,
    config: &PipelineConfig,
) -> ViewSet {
    info!("preparing {dataset:?} views for {} records", records.len());
    log_stage(BatchStage::Fetched);

    let records = match dataset {
        DatasetKind::Incidents => {
            let filtered = filter_recent(
                records,
                now,
                Duration::hours(config.incident_window_hours),
            );
            log_stage(BatchStage::Filtered);
            filtered
        }
        DatasetKind::Flow => records,
    };

    let normalized = normalize_batch(records);
    log_stage(BatchStage::Normalized);

    if normalized.is_empty() {
        info!("empty {dataset:?} batch, serving placeholders");
        return ViewSet::empty(dataset, config.view.default_show_noise);
    }

    let features: Vec<[f64; FEATURES]> = normalized.iter().map(|r| r.scaled).collect();
    let kmeans = KMeans {
        k: config.partitions,
        seed: config.seed,
        ..KMeans::default()
    };
    let partitions = PartitionClusterer::fit(&kmeans, &features);

    let densities = match dataset {
        DatasetKind::Flow => {
            let spatial: Vec<[f64; 2]> =
                normalized.iter().map(|r| r.spatial_features()).collect();
            DensityClusterer::fit(&config.flow_density, &spatial)
        }
        DatasetKind::Incidents => DensityClusterer::fit(&config.incident_density, &features),
    };

    let assignments: Vec<ClusterAssignment> = partitions
        .into_iter()
        .zip(densities)
        .map(|(partition, density)| ClusterAssignment { partition, density })
        .collect();
    let noise_count = assignments.iter().filter(|a| a.is_noise()).count();
    debug!(
        "clustered {} records ({noise_count} density outliers)",
        assignments.len()
    );
    log_stage(BatchStage::Clustered);

    let colors = rank_partition_colors(&normalized, &assignments);
    log_stage(BatchStage::Colored);

    let views = build_view_set(dataset, &normalized, &assignments, &colors, &config.view);
    log_stage(BatchStage::ArtifactsBuilt);
    info!(
        "{dataset:?} batch ready: {} records across all views",
        views.record_count()
    );
    views
}

/// Holder for the batch currently being served.
///
/// Readers take an `Arc` to a fully built, immutable [`ViewSet`]; a refresh
/// swaps the pointer only after the replacement set is complete, so no
/// reader ever observes a half-rebuilt batch. Reads taken before a swap
/// keep their old set alive until dropped.
pub struct CurrentBatch {
    inner: RwLock<Arc<ViewSet>>,
}

impl CurrentBatch {
    pub fn new(initial: ViewSet) -> Self {
        Self {
            inner: RwLock::new(Arc::new(initial)),
        }
    }

    /// Start out with placeholder artifacts until the first fetch lands.
    pub fn empty(dataset: DatasetKind, config: &PipelineConfig) -> Self {
        Self::new(ViewSet::empty(dataset, config.view.default_show_noise))
    }

    /// The currently served set.
    pub fn current(&self) -> Arc<ViewSet> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the served set with a completed one.
    pub fn swap(&self, next: ViewSet) {
        let next = Arc::new(next);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        debug!("swapped in a new batch");
    }
}

// ============================================================================
// Tests
// ============================================================================
