pub mod config;
pub mod error;
pub mod gpxxml;
pub mod partition;

use log::info;
use quick_xml::events::{BytesStart, Event};
use std::path::PathBuf;
use time::OffsetDateTime;

pub use config::{OutputKind, SplitConfig};
pub use error::{Result, SplitError};
pub use gpxxml::{Track, TrackInfo};
pub use partition::{CapacityExceeded, OutputChunk};

/// A single `<trkpt>` read from the input document.
///
/// `lat`/`lon` are parsed for distance and bounds calculations. The original
/// start tag and child content are kept as raw XML events so the point can be
/// re-emitted under a different element name without interpreting them.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: Option<OffsetDateTime>,
    pub(crate) start: BytesStart<'static>,
    pub(crate) content: Vec<Event<'static>>,
}

impl TrackPoint {
    /// Creates a bare point with no child content.
    pub fn new(lat: f64, lon: f64) -> Self {
        let lat_text = lat.to_string();
        let lon_text = lon.to_string();
        let start = BytesStart::new("trkpt").with_attributes([
            ("lat", lat_text.as_str()),
            ("lon", lon_text.as_str()),
        ]);
        Self {
            lat,
            lon,
            time: None,
            start,
            content: Vec::new(),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Min/max latitude and longitude over a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Returns `None` for an empty slice.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = BoundingBox {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for point in &points[1..] {
            bounds.min_lat = bounds.min_lat.min(point.lat);
            bounds.min_lon = bounds.min_lon.min(point.lon);
            bounds.max_lat = bounds.max_lat.max(point.lat);
            bounds.max_lon = bounds.max_lon.max(point.lon);
        }
        Some(bounds)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Calculates the great circle distance in meters between two GPS coordinates
/// using the haversine formula on a spherical Earth.
///
/// References:
/// - R.W. Sinnott, "Virtues of the Haversine", Sky and Telescope, vol. 68, no. 2, 1984, p. 159
/// - https://en.wikipedia.org/wiki/Haversine_formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS: f64 = 6371000.0; // Mean Earth radius in meters

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    // a = sin²(Δφ/2) + cos φ1 ⋅ cos φ2 ⋅ sin²(Δλ/2)
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    // c = 2 ⋅ atan2(√a, √(1−a))
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS * c
}

/// Drops every point closer than `min_distance` meters to the last point that
/// was kept. The first point is always kept and order is preserved.
pub fn reduce_close_points(points: Vec<TrackPoint>, min_distance: f64) -> Result<Vec<TrackPoint>> {
    let mut remaining = points.into_iter();
    let first = remaining.next().ok_or(SplitError::EmptyTrack)?;

    let (mut last_lat, mut last_lon) = (first.lat, first.lon);
    let mut reduced = vec![first];

    for point in remaining {
        if haversine_distance(last_lat, last_lon, point.lat, point.lon) >= min_distance {
            last_lat = point.lat;
            last_lon = point.lon;
            reduced.push(point);
        }
    }

    info!("reduced to {} points (minimum distance {min_distance} m)", reduced.len());
    Ok(reduced)
}

/// Keeps an evenly spaced subset of at most `max_points` items.
///
/// With `ratio = len / max_points`, the item at position `c` is kept iff
/// `c mod ratio < 1`. This is evaluated exactly as `(c * max_points) mod len <
/// max_points`, counting from position 0 so the first item is always kept.
/// Inputs already within budget are returned unchanged.
pub fn reduce_to_max_points<T>(items: Vec<T>, max_points: usize) -> Vec<T> {
    let total = items.len();
    if total <= max_points {
        return items;
    }

    let len = total as u128;
    let budget = max_points as u128;
    let reduced: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter(|(count, _)| (*count as u128 * budget) % len < budget)
        .map(|(_, item)| item)
        .collect();

    info!("reduced to {} points (budget {max_points})", reduced.len());
    reduced
}

/// Point counts and written files from one [`split_file`] run.
#[derive(Debug, Clone)]
pub struct SplitSummary {
    pub loaded: usize,
    pub after_distance_filter: usize,
    pub after_downsample: usize,
    pub files: Vec<PathBuf>,
    pub capacity_exceeded: Option<CapacityExceeded>,
}

/// Runs the whole pipeline for one input file: load, distance filter,
/// downsample to the point budget, then write the chunked output files.
pub fn split_file(config: &SplitConfig) -> Result<SplitSummary> {
    config.validate()?;

    let file_name = config
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            SplitError::InvalidConfig(format!("{} is not a file path", config.input.display()))
        })?;

    let Track { info: track_info, points } = gpxxml::load_track(&config.input)?;
    let loaded = points.len();

    let points = reduce_close_points(points, config.min_distance_meters)?;
    let after_distance_filter = points.len();

    let points = reduce_to_max_points(points, config.max_points());
    let after_downsample = points.len();

    let plan = partition::plan_chunks(&points, config.chunk_size()?, config.max_output_files);
    let output_directory = config.resolved_output_directory();
    let files = partition::write_chunks(
        &plan,
        &track_info,
        config.output_kind,
        &output_directory,
        &file_name,
    )?;

    Ok(SplitSummary {
        loaded,
        after_distance_filter,
        after_downsample,
        files,
        capacity_exceeded: plan.capacity_exceeded,
    })
}
