use clap::Args;
use gpxsplit::config::{DEFAULT_MAX_OUTPUT_FILES, DEFAULT_MIN_DISTANCE, DEFAULT_POINTS_PER_FILE};
use gpxsplit::{OutputKind, SplitConfig, split_file};
use log::info;
use std::error::Error;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// GPX file to split
    pub xml_file: PathBuf,

    /// Maximum number of points per output file
    #[arg(short, long, default_value_t = DEFAULT_POINTS_PER_FILE)]
    pub points: usize,

    /// Maximum number of output files
    #[arg(short = 'f', long, visible_alias = "files", default_value_t = DEFAULT_MAX_OUTPUT_FILES)]
    pub output_file_count: usize,

    /// Drop points closer than this many meters to the last kept point
    #[arg(short = 'd', long, default_value_t = DEFAULT_MIN_DISTANCE)]
    pub min_distance: f64,

    /// Directory for the output files (defaults to the input file's directory)
    #[arg(short, long)]
    pub output_directory: Option<PathBuf>,

    /// How points are wrapped in the output files
    #[arg(short, long, value_enum, default_value_t = OutputKind::Route)]
    pub kind: OutputKind,
}

impl SplitArgs {
    pub fn into_config(self) -> SplitConfig {
        let config = SplitConfig::new(self.xml_file)
            .with_points_per_file(self.points)
            .with_max_output_files(self.output_file_count)
            .with_min_distance(self.min_distance)
            .with_output_kind(self.kind);
        match self.output_directory {
            Some(dir) => config.with_output_directory(dir),
            None => config,
        }
    }
}

pub fn split_command(args: SplitArgs) -> Result<(), Box<dyn Error>> {
    let config = args.into_config();
    let summary = split_file(&config)?;

    info!(
        "{} points loaded, {} after distance filter, {} after downsampling",
        summary.loaded, summary.after_distance_filter, summary.after_downsample
    );
    info!(
        "Wrote {} files to {}",
        summary.files.len(),
        config.resolved_output_directory().display()
    );
    Ok(())
}
