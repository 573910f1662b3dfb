// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: reconstruct building massing from a point cloud and a vision
//! model response.
//!
//! Usage:
//!   sketchmass <points.json> <vision.txt> [options]

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sketchmass_processing::{reconstruct, PipelineSettings, ReconstructionRequest};
use sketchmass_reconstruction::Point;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Points file layout: a bare array or `{"points": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum PointsFile {
    Bare(Vec<Point>),
    Wrapped { points: Vec<Point> },
}

impl PointsFile {
    fn into_points(self) -> Vec<Point> {
        match self {
            PointsFile::Bare(points) | PointsFile::Wrapped { points } => points,
        }
    }
}

struct Options {
    points_path: PathBuf,
    vision_path: PathBuf,
    site_footprint: Option<f64>,
    profile: Option<String>,
    config_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,sketchmass_processing=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return Ok(());
    }
    let options = parse_options(&args)?;

    let mut settings = PipelineSettings::from_env();
    if let Some(profile) = &options.profile {
        settings.profile = profile.clone();
        settings.config_path = None;
    }
    if let Some(path) = &options.config_path {
        settings.config_path = Some(path.clone());
    }
    let config = settings
        .reconstruction_config()
        .context("Cannot resolve reconstruction profile")?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(settings.worker_threads)
        .build_global()
        .context("Failed to initialize thread pool")?;

    tracing::info!(
        worker_threads = settings.worker_threads,
        profile = %config.name,
        points = %options.points_path.display(),
        vision = %options.vision_path.display(),
        "Starting sketchmass"
    );

    let points = read_points(&options.points_path)?;
    let vision_output = fs::read_to_string(&options.vision_path)
        .with_context(|| format!("Cannot read vision output '{}'", options.vision_path.display()))?;

    let request = ReconstructionRequest {
        id: request_id(&options.points_path),
        points,
        vision_output,
        site_footprint: options.site_footprint,
    };
    let reconstruction = reconstruct(&request, &config)?;
    let json = serde_json::to_string_pretty(&reconstruction)?;

    match &options.output_path {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Cannot write output '{}'", path.display()))?;
            tracing::info!(
                output = %path.display(),
                buildings = reconstruction.buildings().len(),
                "Wrote reconstruction"
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options {
        points_path: PathBuf::from(&args[1]),
        vision_path: PathBuf::from(&args[2]),
        site_footprint: None,
        profile: None,
        config_path: None,
        output_path: None,
    };

    let mut i = 3;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args
            .get(i + 1)
            .with_context(|| format!("Missing value for {}", flag))?;
        match flag {
            "--site-footprint" => {
                let area: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid site footprint '{}'", value))?;
                options.site_footprint = Some(area);
            }
            "--profile" => options.profile = Some(value.clone()),
            "--config" => options.config_path = Some(PathBuf::from(value)),
            "--output" => options.output_path = Some(PathBuf::from(value)),
            other => {
                print_usage();
                bail!("Unknown option: {}", other);
            }
        }
        i += 2;
    }
    Ok(options)
}

fn read_points(path: &Path) -> Result<Vec<Point>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Cannot read points '{}'", path.display()))?;
    let file: PointsFile = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid points file '{}'", path.display()))?;
    Ok(file.into_points())
}

fn request_id(points_path: &Path) -> String {
    points_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "request".into())
}

fn print_usage() {
    eprintln!("sketchmass - building massing from a point cloud and a vision model response");
    eprintln!();
    eprintln!("Usage: sketchmass <points.json> <vision.txt> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --site-footprint <area>   Site area for the volume ratio (default: building footprint)");
    eprintln!("  --profile <name>          metric (default) or imperial");
    eprintln!("  --config <file.json>      Reconstruction profile file (overrides --profile)");
    eprintln!("  --output <file.json>      Write the result here instead of stdout");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WORKER_THREADS            Rayon worker threads (default: CPU count)");
    eprintln!("  SKETCHMASS_PROFILE        Default profile name");
    eprintln!("  SKETCHMASS_CONFIG         Default profile file");
    eprintln!("  RUST_LOG                  Log filter (default: info,sketchmass_processing=debug)");
}
