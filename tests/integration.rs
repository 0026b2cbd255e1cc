use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn sample_gpx() -> &'static str {
    include_str!("../samples/lakeside.gpx")
}

/// A fresh, empty directory unique to this test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gpxsplit-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// `count` points heading north, ~111m apart.
fn straight_track(count: usize) -> String {
    let mut gpx = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Straight North</name></metadata>
  <trk>
    <trkseg>
"#,
    );
    for i in 0..count {
        gpx.push_str(&format!(
            "      <trkpt lat=\"{:.3}\" lon=\"10.000\"><ele>{}</ele></trkpt>\n",
            40.0 + i as f64 * 0.001,
            i
        ));
    }
    gpx.push_str("    </trkseg>\n  </trk>\n</gpx>\n");
    gpx
}

fn write_input(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, content).unwrap();
    path
}

fn output_files(dir: &Path, input_name: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&format!("_-_{input_name}")))
        })
        .collect();
    files.sort_by_key(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('_').next())
            .and_then(|index| index.parse::<usize>().ok())
    });
    files
}

fn route_points(path: &Path) -> Vec<gpx::Waypoint> {
    let gpx = gpx::read(fs::File::open(path).unwrap()).unwrap();
    assert_eq!(gpx.routes.len(), 1, "{} should hold one route", path.display());
    gpx.routes.into_iter().next().unwrap().points
}

#[test]
fn test_split_sample_with_defaults_next_to_input() {
    let dir = scratch_dir("defaults");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg(&input).assert().success();

    let files = output_files(&dir, "lakeside.gpx");
    assert_eq!(files, vec![dir.join("1_-_lakeside.gpx")]);

    let gpx = gpx::read(fs::File::open(&files[0]).unwrap()).unwrap();
    assert_eq!(gpx.routes[0].name.as_deref(), Some("1/1 - Lakeside Loop"));
    // Every fourth point repeats its predecessor and the rest are ~8m apart
    assert_eq!(gpx.routes[0].points.len(), 60);
    assert!(gpx.tracks.is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_split_sample_into_several_files() {
    let dir = scratch_dir("several");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());
    let out = dir.join("out");

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("-p")
        .arg("25")
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .assert()
        .success();

    let files = output_files(&out, "lakeside.gpx");
    assert_eq!(files.len(), 3);
    let counts: Vec<usize> = files.iter().map(|f| route_points(f).len()).collect();
    assert_eq!(counts, vec![25, 25, 10]);

    let third = fs::read_to_string(&files[2]).unwrap();
    assert!(third.contains("<name>3/3 - Lakeside Loop</name>"));
    assert!(third.contains("<gpxtpx:hr>"));
    assert!(third.contains("xmlns:gpxtpx="));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_min_distance_controls_point_count() {
    let dir = scratch_dir("distance");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("--min-distance")
        .arg("50")
        .arg(&input)
        .assert()
        .success();

    let files = output_files(&dir, "lakeside.gpx");
    assert_eq!(files.len(), 1);
    let sparse = route_points(&files[0]).len();
    assert!(sparse < 60, "expected fewer than 60 points, got {sparse}");
    assert!(sparse > 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_even_split_without_downsampling() {
    let dir = scratch_dir("even");
    let input = write_input(&dir, "north.gpx", &straight_track(1000));

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("-p")
        .arg("100")
        .arg("-f")
        .arg("10")
        .arg(&input)
        .assert()
        .success();

    let files = output_files(&dir, "north.gpx");
    assert_eq!(files.len(), 10);
    for file in &files {
        assert_eq!(route_points(file).len(), 100);
    }

    // Concatenated output keeps the original order
    let elevations: Vec<f64> = files
        .iter()
        .flat_map(|file| route_points(file))
        .map(|p| p.elevation.unwrap())
        .collect();
    let expected: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    assert_eq!(elevations, expected);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_downsampling_fits_point_budget() {
    let dir = scratch_dir("budget");
    let input = write_input(&dir, "north.gpx", &straight_track(1000));

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("-p")
        .arg("10")
        .arg("-f")
        .arg("5")
        .arg(&input)
        .assert()
        .success();

    let files = output_files(&dir, "north.gpx");
    assert!(files.len() <= 5);
    let counts: Vec<usize> = files.iter().map(|f| route_points(f).len()).collect();
    assert!(counts.iter().all(|&c| c <= 10));
    let total: usize = counts.iter().sum();
    assert!(total <= 50 && total >= 45, "got {total} points");

    let first = &route_points(&files[0])[0];
    assert_eq!(first.elevation, Some(0.0));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_waypoints_output() {
    let dir = scratch_dir("waypoints");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("--kind")
        .arg("waypoints")
        .arg(&input)
        .assert()
        .success();

    let files = output_files(&dir, "lakeside.gpx");
    let gpx = gpx::read(fs::File::open(&files[0]).unwrap()).unwrap();
    assert!(gpx.routes.is_empty());
    assert_eq!(gpx.waypoints.len(), 60);
    assert_eq!(
        gpx.metadata.unwrap().name.as_deref(),
        Some("1/1 - Lakeside Loop")
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_empty_track_fails_without_output() {
    let dir = scratch_dir("empty");
    let input = write_input(
        &dir,
        "empty.gpx",
        r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test"><trk><trkseg></trkseg></trk></gpx>"#,
    );

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no points"));

    assert!(output_files(&dir, "empty.gpx").is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_malformed_input_fails() {
    let dir = scratch_dir("malformed");
    let input = write_input(&dir, "broken.gpx", "<gpx><trk><trkseg></trk></gpx>");

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error"));

    assert!(output_files(&dir, "broken.gpx").is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_non_gpx_input_fails() {
    let dir = scratch_dir("garbage");
    let input = write_input(&dir, "notes.gpx", "this is not xml at all\n");

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse error"));

    assert!(output_files(&dir, "notes.gpx").is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_input_fails() {
    let dir = scratch_dir("missing");

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg(dir.join("nope.gpx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_zero_points_per_file_fails() {
    let dir = scratch_dir("zero");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("-p")
        .arg("0")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unwritable_output_directory_fails() {
    let dir = scratch_dir("unwritable");
    let input = write_input(&dir, "lakeside.gpx", sample_gpx());
    let blocker = write_input(&dir, "blocker", "");

    let mut cmd = cargo_bin_cmd!("gpxsplit");
    cmd.arg("-o")
        .arg(blocker.join("out"))
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to write"));

    fs::remove_dir_all(&dir).unwrap();
}
