mod config;
mod heights;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::{Vec2, Vec3};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use terrain::{HeightEdit, Terrain, TerrainBuilder, TileId};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, ToolConfig};

#[derive(Parser)]
#[command(name = "terraintool")]
#[command(about = "Geomipmap terrain inspection tool", long_about = None)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, global = true, default_value = "terraintool.toml")]
    config: PathBuf,

    /// Log at debug level when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the terrain and print its tree and height statistics
    Info,

    /// Move a viewpoint across the terrain and report LOD activity per frame
    Flythrough {
        /// Number of frames, overrides [flythrough].frames
        #[arg(short, long)]
        frames: Option<u32>,
    },

    /// Apply one height edit from a worker thread and report the normals it touched
    Edit {
        /// World x coordinate
        #[arg(short, long, allow_negative_numbers = true)]
        x: f32,

        /// World z coordinate
        #[arg(short, long, allow_negative_numbers = true)]
        z: f32,

        /// New height, or delta with --adjust
        #[arg(long, allow_negative_numbers = true)]
        value: f32,

        /// Add the value to the current height instead of replacing it
        #[arg(short, long)]
        adjust: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = load_config(&cli.config)?;
    let mut terrain = build_terrain(&config)?;

    match cli.command {
        Commands::Info => print_info(&terrain),
        Commands::Flythrough { frames } => {
            let frames = frames.unwrap_or(config.flythrough.frames);
            run_flythrough(&mut terrain, &config, frames);
        }
        Commands::Edit { x, z, value, adjust } => {
            let edit = if adjust {
                HeightEdit::adjust(Vec2::new(x, z), value)
            } else {
                HeightEdit::set(Vec2::new(x, z), value)
            };
            run_edit(&mut terrain, edit)?;
        }
    }

    Ok(())
}

fn build_terrain(config: &ToolConfig) -> Result<Terrain> {
    let start = Instant::now();
    let size = config.terrain.total_size;
    let samples = heights::generate(size, &config.generator);
    let terrain = TerrainBuilder::new(config.terrain.clone())
        .build(Some(&samples))
        .context("Failed to build terrain")?;
    info!(
        "Built {}x{} terrain in {:.1}ms",
        size,
        size,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(terrain)
}

fn lod_histogram(terrain: &Terrain) -> BTreeMap<u32, usize> {
    let mut histogram = BTreeMap::new();
    for leaf in terrain.all_leaves() {
        if let Some(patch) = terrain.leaf(leaf) {
            *histogram.entry(patch.lod()).or_insert(0) += 1;
        }
    }
    histogram
}

fn print_info(terrain: &Terrain) {
    let config = terrain.config();
    println!("Terrain");
    println!("  total size:  {}", config.total_size);
    println!("  patch size:  {}", config.patch_size);
    println!("  leaf size:   {}", config.leaf_size());
    println!("  step scale:  {:?}", config.step_scale);
    println!("  tiles:       {}", terrain.tile_count());
    println!("  nodes:       {}", terrain.node_count());
    println!("  leaves:      {}", terrain.leaf_count());

    for tile in terrain.tiles() {
        let Some(samples) = terrain.height_map(tile.id()) else {
            continue;
        };
        let (min, max) = samples
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        println!("  tile {:?}: heights {:.2}..{:.2}", tile.id(), min, max);
        if let Some(bound) = terrain.tile_bound(tile.id()) {
            println!("    world bound {:?} .. {:?}", bound.min, bound.max);
        }
    }

    let triangles: usize = terrain
        .all_leaves()
        .into_iter()
        .filter_map(|leaf| terrain.leaf(leaf))
        .map(|patch| patch.mesh().triangle_count())
        .sum();
    println!("  triangles:   {}", triangles);
}

fn run_flythrough(terrain: &mut Terrain, config: &ToolConfig, frames: u32) {
    let flight = &config.flythrough;
    let start = Instant::now();
    let mut changed = 0;
    let mut reindexed = 0;
    let mut clamped = 0;

    for frame in 0..frames {
        let t = if frames > 1 {
            frame as f32 / (frames - 1) as f32
        } else {
            0.0
        };
        let eye: Vec3 = flight.start.lerp(flight.end, t);
        let report = terrain.update(&[eye]);
        debug!(
            "frame {} eye {:?}: {} changed, {} reindexed, {} clamped",
            frame,
            eye,
            report.lod.changed.len(),
            report.lod.reindexed.len(),
            report.lod.clamped
        );
        changed += report.lod.changed.len();
        reindexed += report.lod.reindexed.len();
        clamped += report.lod.clamped;
    }

    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        "{} frames in {:.1}ms ({:.3}ms/frame)",
        frames,
        elapsed,
        elapsed / frames.max(1) as f64
    );
    println!("Flythrough");
    println!("  frames:      {}", frames);
    println!("  lod changes: {}", changed);
    println!("  reindexed:   {}", reindexed);
    println!("  clamped:     {}", clamped);
    println!("  final lod histogram:");
    for (lod, count) in lod_histogram(terrain) {
        println!("    lod {}: {} patches", lod, count);
    }
}

/// Normals in a small window around the edited sample of every containing tile
fn normal_window(terrain: &Terrain, position: Vec2) -> Vec<(TileId, u32, u32, Option<Vec3>)> {
    const RADIUS: i64 = 2;
    let mut window = Vec::new();
    for id in terrain.tiles_containing(position) {
        let Some(tile) = terrain.tile(id) else {
            continue;
        };
        let Some((cx, cz)) = tile.nearest_sample(position) else {
            continue;
        };
        let last = tile.total_size() as i64 - 1;
        for z in (cz as i64 - RADIUS).max(0)..=(cz as i64 + RADIUS).min(last) {
            for x in (cx as i64 - RADIUS).max(0)..=(cx as i64 + RADIUS).min(last) {
                let (x, z) = (x as u32, z as u32);
                window.push((id, x, z, terrain.normal_at_sample(id, x, z)));
            }
        }
    }
    window
}

fn run_edit(terrain: &mut Terrain, edit: HeightEdit) -> Result<()> {
    let before = normal_window(terrain, edit.position);
    if before.is_empty() {
        anyhow::bail!("Position {:?} is outside the terrain", edit.position);
    }
    let old_height = terrain.height(edit.position);

    // Edits are queued from another thread and drained by the next update
    let editor = terrain.editor();
    std::thread::spawn(move || editor.push(edit))
        .join()
        .map_err(|_| anyhow::anyhow!("Edit thread panicked"))?;

    let report = terrain.update(&[]);
    let after = normal_window(terrain, edit.position);
    let changed = before
        .iter()
        .zip(&after)
        .filter(|(a, b)| a.3 != b.3)
        .count();

    println!("Edit");
    println!("  position:    {:?}", edit.position);
    println!("  mode:        {:?}", edit.mode);
    println!("  applied:     {}", report.edits_applied);
    println!(
        "  height:      {:?} -> {:?}",
        old_height,
        terrain.height(edit.position)
    );
    println!("  normals recomputed in flush: {}", report.normals_recomputed);
    println!("  normals changed near edit:   {}", changed);
    Ok(())
}
