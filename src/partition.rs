use crate::config::OutputKind;
use crate::error::{Result, SplitError};
use crate::gpxxml::{GpxDocument, TrackInfo};
use crate::{BoundingBox, TrackPoint};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// More output files are needed than the configured maximum.
///
/// This is reported, not enforced: every chunk is still written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub points: usize,
    pub points_per_file: usize,
    pub max_output_files: usize,
    pub required_files: usize,
}

impl fmt::Display for CapacityExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} points at {} points per file need {} files, more than the maximum of {}",
            self.points, self.points_per_file, self.required_files, self.max_output_files
        )
    }
}

/// A contiguous run of points destined for one output file.
#[derive(Debug, Clone)]
pub struct OutputChunk<'a> {
    /// 1-based.
    pub index: usize,
    pub total: usize,
    pub points: &'a [TrackPoint],
    pub bounds: Option<BoundingBox>,
}

impl OutputChunk<'_> {
    pub fn name(&self, display_name: &str) -> String {
        format!("{}/{} - {}", self.index, self.total, display_name)
    }
}

#[derive(Debug, Clone)]
pub struct PartitionPlan<'a> {
    pub chunks: Vec<OutputChunk<'a>>,
    pub capacity_exceeded: Option<CapacityExceeded>,
}

/// Splits `points` into consecutive chunks of at most `points_per_file`.
pub fn plan_chunks(
    points: &[TrackPoint],
    points_per_file: NonZeroUsize,
    max_output_files: usize,
) -> PartitionPlan<'_> {
    let per_file = points_per_file.get();
    let total = points.len().div_ceil(per_file);

    let capacity_exceeded = (total > max_output_files).then(|| CapacityExceeded {
        points: points.len(),
        points_per_file: per_file,
        max_output_files,
        required_files: total,
    });
    if let Some(exceeded) = &capacity_exceeded {
        warn!("{exceeded}; writing all {total} files anyway");
    }

    let chunks = points
        .chunks(per_file)
        .enumerate()
        .map(|(i, slice)| OutputChunk {
            index: i + 1,
            total,
            points: slice,
            bounds: BoundingBox::from_points(slice),
        })
        .collect();

    PartitionPlan {
        chunks,
        capacity_exceeded,
    }
}

/// Builds the output document for one chunk. `None` for an empty chunk.
pub fn build_document<'a>(
    chunk: &OutputChunk<'a>,
    track_info: &'a TrackInfo,
    kind: OutputKind,
) -> Option<GpxDocument<'a>> {
    let bounds = chunk.bounds?;
    Some(GpxDocument {
        name: chunk.name(&track_info.name),
        time: chunk.points.iter().find_map(|point| point.time),
        bounds,
        kind,
        track_info,
        points: chunk.points,
    })
}

pub fn output_file_name(index: usize, input_file_name: &str) -> String {
    format!("{index}_-_{input_file_name}")
}

/// Writes one file per chunk into `output_directory`, creating it if needed.
///
/// Stops at the first failed write; files already written are left in place.
pub fn write_chunks(
    plan: &PartitionPlan<'_>,
    track_info: &TrackInfo,
    kind: OutputKind,
    output_directory: &Path,
    input_file_name: &str,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_directory).map_err(|source| SplitError::Write {
        path: output_directory.to_path_buf(),
        source,
    })?;

    info!("Writing {} files", plan.chunks.len());

    let mut written = Vec::with_capacity(plan.chunks.len());
    for chunk in &plan.chunks {
        let Some(document) = build_document(chunk, track_info, kind) else {
            warn!("Skipping empty chunk {}/{}", chunk.index, chunk.total);
            continue;
        };

        let path = output_directory.join(output_file_name(chunk.index, input_file_name));
        info!("Writing {}/{} files", chunk.index, chunk.total);

        let bytes = document.to_bytes()?;
        fs::write(&path, bytes).map_err(|source| SplitError::Write {
            path: path.clone(),
            source,
        })?;
        debug!("wrote {} points to {}", chunk.points.len(), path.display());

        written.push(path);
    }

    Ok(written)
}
