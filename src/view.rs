//! View building and the precomputed artifact cache.
//!
//! Every requested `(view mode, show noise)` combination is built eagerly,
//! once, right after clustering. Selecting a view at presentation time is a
//! pure map lookup. Toggling never recomputes anything, so toggle latency
//! is independent of batch size.
//!
//! Excluding noise removes density outliers from the artifact entirely; they
//! are omitted, not grayed out. When the batch was empty, every lookup
//! degrades to the [`ViewArtifact::NoData`] placeholder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterAssignment;
use crate::normalize::NormalizedRecord;
use crate::rank::{criticality_color, NOISE_COLOR, RAW_COLOR};
use crate::{Bounds, DatasetKind, GeoPoint, RecordDetails};

/// Upper bound of the jam-factor scale, used to normalize heat weights.
const JAM_SCALE: f64 = 10.0;

/// Meters per degree of latitude, for the heat grid.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// One selectable map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Plain dots, no clustering applied.
    Raw,
    /// Dots colored by severity rank of their partition cluster.
    ClusteredDot,
    /// Grid-aggregated severity heat over density-clustered records.
    ClusteredHeatmap,
    /// Per-record severity heat.
    Heatmap,
    /// Incident dots colored by criticality with noise marking.
    Combined,
}

impl ViewMode {
    /// Whether the noise toggle changes this view. For the other modes the
    /// toggle is ignored and a single variant is cached.
    pub fn uses_noise_toggle(self) -> bool {
        matches!(self, Self::ClusteredDot | Self::ClusteredHeatmap | Self::Combined)
    }
}

impl DatasetKind {
    /// View modes available for this dataset kind.
    pub fn view_modes(self) -> &'static [ViewMode] {
        match self {
            Self::Flow => &[
                ViewMode::Raw,
                ViewMode::ClusteredDot,
                ViewMode::ClusteredHeatmap,
                ViewMode::Heatmap,
            ],
            Self::Incidents => &[ViewMode::Raw, ViewMode::Combined],
        }
    }
}

/// A single renderable marker: unscaled position, display color and the
/// popup field pairs the render layer shows on tap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPoint {
    pub position: GeoPoint,
    pub color: &'static str,
    pub popup: Vec<(String, String)>,
}

/// Dot-marker layer with a precomputed map center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DotLayer {
    pub center: GeoPoint,
    pub points: Vec<RenderPoint>,
}

/// One weighted position of a heat layer; weight is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub position: GeoPoint,
    pub weight: f64,
}

/// Gradient layer with a precomputed map center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatLayer {
    pub center: GeoPoint,
    pub cells: Vec<HeatCell>,
}

/// A precomputed, immutable view artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ViewArtifact {
    Dots(DotLayer),
    Heat(HeatLayer),
    /// Placeholder served when the batch was empty or the view does not
    /// exist for the dataset kind.
    NoData,
}

static NO_DATA: ViewArtifact = ViewArtifact::NoData;

/// Knobs for view construction.
#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    /// Cell size of the aggregated heat grid, in meters.
    pub heat_cell_meters: f64,
    /// Whether noise points are shown when the caller does not say.
    pub default_show_noise: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            heat_cell_meters: 250.0,
            default_show_noise: true,
        }
    }
}

/// Every precomputed artifact for one batch, keyed by view mode and the
/// noise toggle. Never mutated after construction; the next fetch cycle
/// replaces the whole set.
#[derive(Debug, Clone)]
pub struct ViewSet {
    dataset: DatasetKind,
    record_count: usize,
    default_show_noise: bool,
    artifacts: HashMap<(ViewMode, bool), ViewArtifact>,
}

impl ViewSet {
    /// An artifact-less set: every lookup yields the placeholder.
    pub fn empty(dataset: DatasetKind, default_show_noise: bool) -> Self {
        Self {
            dataset,
            record_count: 0,
            default_show_noise,
            artifacts: HashMap::new(),
        }
    }

    /// Pure lookup of a precomputed artifact.
    ///
    /// `show_noise` is normalized away for modes without a noise toggle.
    /// Unknown combinations (empty batch, or a mode the dataset kind does
    /// not support) yield the placeholder.
    pub fn artifact(&self, mode: ViewMode, show_noise: bool) -> &ViewArtifact {
        let key = (mode, show_noise && mode.uses_noise_toggle());
        self.artifacts.get(&key).unwrap_or(&NO_DATA)
    }

    /// Lookup with the configured default noise visibility.
    pub fn default_artifact(&self, mode: ViewMode) -> &ViewArtifact {
        self.artifact(mode, self.default_show_noise)
    }

    /// Total records in the batch, for display.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn dataset(&self) -> DatasetKind {
        self.dataset
    }
}

/// Build every artifact for the batch eagerly.
pub fn build_view_set(
    dataset: DatasetKind,
    records: &[NormalizedRecord],
    assignments: &[ClusterAssignment],
    partition_colors: &HashMap<usize, &'static str>,
    config: &ViewConfig,
) -> ViewSet {
    if records.is_empty() {
        return ViewSet::empty(dataset, config.default_show_noise);
    }

    let center = batch_center(records);
    let mut artifacts = HashMap::new();

    for &mode in dataset.view_modes() {
        if mode.uses_noise_toggle() {
            for show_noise in [true, false] {
                let artifact = build_artifact(
                    mode, show_noise, records, assignments, partition_colors, center, config,
                );
                artifacts.insert((mode, show_noise), artifact);
            }
        } else {
            let artifact = build_artifact(
                mode, true, records, assignments, partition_colors, center, config,
            );
            artifacts.insert((mode, false), artifact);
        }
    }

    ViewSet {
        dataset,
        record_count: records.len(),
        default_show_noise: config.default_show_noise,
        artifacts,
    }
}

fn build_artifact(
    mode: ViewMode,
    show_noise: bool,
    records: &[NormalizedRecord],
    assignments: &[ClusterAssignment],
    partition_colors: &HashMap<usize, &'static str>,
    center: GeoPoint,
    config: &ViewConfig,
) -> ViewArtifact {
    match mode {
        ViewMode::Raw => {
            let points = records
                .iter()
                .map(|record| RenderPoint {
                    position: record.raw.position,
                    color: RAW_COLOR,
                    popup: base_popup(record),
                })
                .collect();
            ViewArtifact::Dots(DotLayer { center, points })
        }
        ViewMode::ClusteredDot => {
            let points = records
                .iter()
                .zip(assignments)
                .filter(|(_, assignment)| show_noise || !assignment.is_noise())
                .map(|(record, assignment)| {
                    let color = if assignment.is_noise() {
                        NOISE_COLOR
                    } else {
                        partition_colors
                            .get(&assignment.partition)
                            .copied()
                            .unwrap_or(RAW_COLOR)
                    };
                    RenderPoint {
                        position: record.raw.position,
                        color,
                        popup: clustered_popup(record, assignment),
                    }
                })
                .collect();
            ViewArtifact::Dots(DotLayer { center, points })
        }
        ViewMode::Combined => {
            let points = records
                .iter()
                .zip(assignments)
                .filter(|(_, assignment)| show_noise || !assignment.is_noise())
                .map(|(record, assignment)| {
                    // Criticality coloring wins; partition rank is the
                    // fallback when the label is missing.
                    let color = if assignment.is_noise() {
                        NOISE_COLOR
                    } else {
                        record_color(record, assignment, partition_colors)
                    };
                    RenderPoint {
                        position: record.raw.position,
                        color,
                        popup: clustered_popup(record, assignment),
                    }
                })
                .collect();
            ViewArtifact::Dots(DotLayer { center, points })
        }
        ViewMode::Heatmap => {
            let cells = records
                .iter()
                .map(|record| HeatCell {
                    position: record.raw.position,
                    weight: (record.severity() / JAM_SCALE).clamp(0.0, 1.0),
                })
                .collect();
            ViewArtifact::Heat(HeatLayer { center, cells })
        }
        ViewMode::ClusteredHeatmap => {
            let mut grid = HeatGrid::new(config.heat_cell_meters, center.lat);
            for (record, assignment) in records.iter().zip(assignments) {
                if assignment.is_noise() && !show_noise {
                    continue;
                }
                grid.add(record.raw.position, record.severity());
            }
            ViewArtifact::Heat(HeatLayer { center, cells: grid.build() })
        }
    }
}

fn record_color(
    record: &NormalizedRecord,
    assignment: &ClusterAssignment,
    partition_colors: &HashMap<usize, &'static str>,
) -> &'static str {
    let partition_fallback = partition_colors
        .get(&assignment.partition)
        .copied()
        .unwrap_or(RAW_COLOR);
    match &record.raw.details {
        RecordDetails::Incident(info) => match info.criticality {
            Some(criticality) => criticality_color(Some(criticality)),
            None => partition_fallback,
        },
        RecordDetails::Flow(_) => partition_fallback,
    }
}

fn batch_center(records: &[NormalizedRecord]) -> GeoPoint {
    let positions: Vec<GeoPoint> = records.iter().map(|r| r.raw.position).collect();
    Bounds::from_points(&positions)
        .map(|b| b.center())
        .unwrap_or(GeoPoint::new(0.0, 0.0))
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map_or_else(
        || "unknown".to_string(),
        |t| t.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

fn base_popup(record: &NormalizedRecord) -> Vec<(String, String)> {
    let mut fields = vec![("Location".to_string(), record.raw.description.clone())];
    match &record.raw.details {
        RecordDetails::Flow(flow) => {
            fields.push(("Speed".to_string(), format!("{:.1}", flow.speed)));
            fields.push((
                "Free flow speed".to_string(),
                format!("{:.1}", flow.free_flow_speed),
            ));
            fields.push(("Jam factor".to_string(), format!("{:.1}", flow.jam_factor)));
        }
        RecordDetails::Incident(info) => {
            let label = info
                .criticality
                .map_or("unknown", |c| c.label());
            fields.push(("Criticality".to_string(), label.to_string()));
            fields.push(("Type".to_string(), info.incident_type.clone()));
            fields.push(("Start time".to_string(), format_time(info.start_time)));
            fields.push(("End time".to_string(), format_time(info.end_time)));
            if info.road_closed {
                fields.push(("Road closed".to_string(), "yes".to_string()));
            }
        }
    }
    fields
}

fn clustered_popup(
    record: &NormalizedRecord,
    assignment: &ClusterAssignment,
) -> Vec<(String, String)> {
    let mut fields = base_popup(record);
    fields.push((
        "K-means cluster".to_string(),
        assignment.partition.to_string(),
    ));
    fields.push((
        "DBSCAN cluster".to_string(),
        assignment.density.to_string(),
    ));
    fields.push((
        "Scaled severity".to_string(),
        format!("{:.2}", record.scaled[2]),
    ));
    fields
}

// ============================================================================
// Heat grid
// ============================================================================

/// Sparse meter-grid accumulator for the aggregated heat view.
///
/// Positions bucket into fixed-size cells relative to a reference latitude;
/// each cell keeps the mean severity of its contributors.
struct HeatGrid {
    cell_meters: f64,
    ref_lat: f64,
    cells: HashMap<(i32, i32), (f64, u32)>,
}

impl HeatGrid {
    fn new(cell_meters: f64, ref_lat: f64) -> Self {
        Self {
            cell_meters,
            ref_lat,
            cells: HashMap::new(),
        }
    }

    fn grid_coords(&self, position: GeoPoint) -> (i32, i32) {
        let lng_meters_per_deg = METERS_PER_DEGREE * self.ref_lat.to_radians().cos();
        let row = ((position.lat - self.ref_lat) * METERS_PER_DEGREE / self.cell_meters)
            .floor() as i32;
        let col = (position.lng * lng_meters_per_deg / self.cell_meters).floor() as i32;
        (row, col)
    }

    fn cell_center(&self, row: i32, col: i32) -> GeoPoint {
        let lng_meters_per_deg = METERS_PER_DEGREE * self.ref_lat.to_radians().cos();
        GeoPoint::new(
            self.ref_lat + (row as f64 + 0.5) * self.cell_meters / METERS_PER_DEGREE,
            (col as f64 + 0.5) * self.cell_meters / lng_meters_per_deg,
        )
    }

    fn add(&mut self, position: GeoPoint, severity: f64) {
        let key = self.grid_coords(position);
        let cell = self.cells.entry(key).or_insert((0.0, 0));
        cell.0 += severity;
        cell.1 += 1;
    }

    fn build(self) -> Vec<HeatCell> {
        let mut cells: Vec<HeatCell> = self
            .cells
            .iter()
            .map(|(&(row, col), &(total, count))| HeatCell {
                position: self.cell_center(row, col),
                weight: (total / f64::from(count) / JAM_SCALE).clamp(0.0, 1.0),
            })
            .collect();
        // Stable output order for identical batches.
        cells.sort_by(|a, b| {
            (a.position.lat, a.position.lng)
                .partial_cmp(&(b.position.lat, b.position.lng))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        cells
    }
}

// ============================================================================
// Tests
// ============================================================================
