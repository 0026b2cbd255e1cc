use crate::error::{Result, SplitError};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MIN_DISTANCE: f64 = 10.0;
pub const DEFAULT_POINTS_PER_FILE: usize = 250;
pub const DEFAULT_MAX_OUTPUT_FILES: usize = 10;

/// How retained track points are wrapped in the output documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputKind {
    /// One named `<rte>` holding `<rtept>` elements.
    #[default]
    Route,
    /// Top-level `<wpt>` elements.
    Waypoints,
}

impl OutputKind {
    pub fn point_tag(self) -> &'static str {
        match self {
            OutputKind::Route => "rtept",
            OutputKind::Waypoints => "wpt",
        }
    }
}

/// Settings for one split run. Built once and never changed afterwards.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub input: PathBuf,
    pub output_directory: Option<PathBuf>,
    pub min_distance_meters: f64,
    pub points_per_file: usize,
    pub max_output_files: usize,
    pub output_kind: OutputKind,
}

impl SplitConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_directory: None,
            min_distance_meters: DEFAULT_MIN_DISTANCE,
            points_per_file: DEFAULT_POINTS_PER_FILE,
            max_output_files: DEFAULT_MAX_OUTPUT_FILES,
            output_kind: OutputKind::default(),
        }
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn with_min_distance(mut self, meters: f64) -> Self {
        self.min_distance_meters = meters;
        self
    }

    pub fn with_points_per_file(mut self, points: usize) -> Self {
        self.points_per_file = points;
        self
    }

    pub fn with_max_output_files(mut self, files: usize) -> Self {
        self.max_output_files = files;
        self
    }

    pub fn with_output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_size()?;
        if self.max_output_files == 0 {
            return Err(SplitError::InvalidConfig(
                "output file count must be at least 1".into(),
            ));
        }
        if !self.min_distance_meters.is_finite() || self.min_distance_meters < 0.0 {
            return Err(SplitError::InvalidConfig(format!(
                "minimum distance must be a non-negative number, got {}",
                self.min_distance_meters
            )));
        }
        Ok(())
    }

    /// Points per output file, rejecting zero.
    pub fn chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.points_per_file).ok_or_else(|| {
            SplitError::InvalidConfig("points per file must be at least 1".into())
        })
    }

    /// Total point budget across all output files.
    pub fn max_points(&self) -> usize {
        self.points_per_file.saturating_mul(self.max_output_files)
    }

    /// The explicit output directory, else the input file's directory, else `.`.
    pub fn resolved_output_directory(&self) -> PathBuf {
        if let Some(dir) = &self.output_directory {
            return dir.clone();
        }
        match self.input.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
