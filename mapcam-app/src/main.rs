use anyhow::Context;
use clap::Parser;
use mapcam::{CoveringTilesOptions, LatLng, OverscaledTileID, ProjectionSpec, Transform, TransformOptions};
use serde::Serialize;
use std::path::PathBuf;

/// Prints the tiles a map camera needs as JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file with transform options
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1024.0)]
    width: f64,

    #[arg(long, default_value_t = 768.0)]
    height: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lng: f64,

    #[arg(short = 'z', long, default_value_t = 2.0)]
    zoom: f64,

    /// Degrees
    #[arg(long, default_value_t = 0.0)]
    pitch: f64,

    /// Degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    bearing: f64,

    /// mercator, globe or equirectangular
    #[arg(long)]
    projection: Option<String>,

    #[arg(long, default_value_t = 512.0)]
    tile_size: f64,

    #[arg(long)]
    min_zoom: Option<u8>,

    #[arg(long)]
    max_zoom: Option<u8>,

    #[arg(long)]
    round_zoom: bool,

    /// Also print the neighbours next to visible quadrants
    #[arg(long)]
    extend: bool,
}

#[derive(Serialize)]
struct Output {
    center: LatLng,
    zoom: f64,
    bounds: [f64; 4],
    tiles: Vec<OverscaledTileID>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extension: Vec<OverscaledTileID>,
}

fn build_transform(args: &Args) -> anyhow::Result<Transform> {
    let mut options = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            TransformOptions::from_json(&json)?
        }
        None => TransformOptions::default(),
    };
    if let Some(name) = &args.projection {
        options = options.with_projection(ProjectionSpec::new(name.as_str()));
    }

    let mut tr = Transform::new(options)?;
    tr.resize(args.width, args.height);
    tr.set_zoom(args.zoom);
    tr.set_center(LatLng::new(args.lat, args.lng));
    tr.set_pitch(args.pitch);
    tr.set_bearing(args.bearing);
    tr.validate()?;
    Ok(tr)
}

fn main() -> anyhow::Result<()> {
    mapcam::init_logger();
    let args = Args::parse();

    let tr = build_transform(&args)?;
    log::info!("camera {:?} at zoom {}", tr.center(), tr.zoom());

    let mut options = CoveringTilesOptions::new(args.tile_size)
        .with_round_zoom(args.round_zoom)
        .with_quadrant_visibility(args.extend);
    options.min_zoom = args.min_zoom;
    options.max_zoom = args.max_zoom;

    let tiles = tr.covering_tiles(&options);
    let extension = if args.extend {
        let z = tiles.iter().map(|t| t.canonical.z).max().unwrap_or(0);
        tr.extend_tile_cover(&tiles, z, None)
    } else {
        Vec::new()
    };

    let bounds = tr.get_bounds();
    let output = Output {
        center: tr.center(),
        zoom: tr.zoom(),
        bounds: [bounds.west(), bounds.south(), bounds.east(), bounds.north()],
        tiles,
        extension,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
