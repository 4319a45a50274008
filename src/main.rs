use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use vol2mesh::{
    process_stack_directory_with, CompressionMethod, GeometricAnalysis, Mesh, MeshFormat, MeshingConfig, QuadricConfig,
    SimplifyBackend,
};

/// Convert volumetric label images into triangle surface meshes
#[derive(Debug, Parser)]
#[command(name = "vol2mesh", version, about)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mesh every TIFF label stack in a directory
    Stacks {
        /// Directory of multi-page TIFF label stacks
        labels_dir: PathBuf,
        /// Where meshes are written (created if missing)
        output_dir: PathBuf,
        /// TOML config file; command-line flags override it
        #[arg(long, env = "VOL2MESH_CONFIG")]
        config: Option<PathBuf>,
        /// Fraction of faces to keep after decimation
        #[arg(long)]
        simplify: Option<f64>,
        /// Laplacian smoothing rounds
        #[arg(long)]
        smoothing: Option<usize>,
        /// Sample every n-th voxel
        #[arg(long)]
        step_size: Option<usize>,
        /// Output format: obj, ngmesh or vtu
        #[arg(long)]
        format: Option<String>,
        /// Use the external fq-mesh-simplify tool instead of the built-in decimator
        #[arg(long)]
        external_simplifier: bool,
    },

    /// Read a mesh (file, directory or .tar), process it and write it out
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Merge duplicate vertices
        #[arg(long)]
        stitch: bool,
        /// Laplacian smoothing rounds
        #[arg(long, default_value_t = 0)]
        smooth: usize,
        /// Fraction of faces to keep after decimation
        #[arg(long)]
        simplify: Option<f64>,
        /// Report the lz4-compressed size of the result
        #[arg(long)]
        compress_report: bool,
    },

    /// Print a summary and quality report for a mesh
    Info { input: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // VOL2MESH_LOG=debug (or any EnvFilter directive) overrides --verbose
    let log_level = std::env::var("VOL2MESH_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match cli.command {
        Commands::Stacks {
            labels_dir,
            output_dir,
            config,
            simplify,
            smoothing,
            step_size,
            format,
            external_simplifier,
        } => {
            let mut meshing = match config {
                Some(path) => MeshingConfig::load_from_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => MeshingConfig::default(),
            };
            if simplify.is_some() {
                meshing.simplify_ratio = simplify;
            }
            if let Some(rounds) = smoothing {
                meshing.smoothing_rounds = rounds;
            }
            if let Some(step) = step_size {
                meshing.step_size = step;
            }
            if let Some(name) = format {
                meshing.output_format = MeshFormat::from_name(&name)?;
            }
            if external_simplifier {
                meshing.simplify_backend = SimplifyBackend::External {
                    program: "fq-mesh-simplify".to_string(),
                    timeout_secs: None,
                };
            }
            meshing.validate()?;
            run_stacks(&labels_dir, &output_dir, &meshing)
        }
        Commands::Convert {
            input,
            output,
            stitch,
            smooth,
            simplify,
            compress_report,
        } => run_convert(&input, &output, stitch, smooth, simplify, compress_report),
        Commands::Info { input } => run_info(&input),
    }
}

fn read_any(input: &Path) -> Result<Mesh> {
    let mesh = if input.is_dir() {
        Mesh::from_directory(input)
    } else if input.extension().and_then(|e| e.to_str()) == Some("tar") {
        Mesh::from_tarfile(input)
    } else {
        Mesh::from_file(input)
    };
    mesh.with_context(|| format!("Failed to read {}", input.display()))
}

fn run_stacks(labels_dir: &Path, output_dir: &Path, config: &MeshingConfig) -> Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let summary = process_stack_directory_with(labels_dir, output_dir, config, |progress| {
        pb.set_length(progress.total as u64);
        pb.set_position(progress.done as u64);
        if let Some(name) = progress.stack_path.file_name() {
            pb.set_message(name.to_string_lossy().into_owned());
        }
    })
    .with_context(|| format!("Failed to mesh stacks in {}", labels_dir.display()))?;
    pb.finish_and_clear();

    if summary.total() == 0 {
        warn!("No label stacks found in {}", labels_dir.display());
        return Ok(());
    }
    info!(
        "{} processed, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        bail!("{} of {} stacks failed", summary.failed, summary.total());
    }
    Ok(())
}

fn run_convert(
    input: &Path,
    output: &Path,
    stitch: bool,
    smooth: usize,
    simplify: Option<f64>,
    compress_report: bool,
) -> Result<()> {
    let mut mesh = read_any(input)?;
    info!("Read {} vertices and {} faces", mesh.vertex_count(), mesh.face_count());

    if stitch && mesh.stitch_adjacent_faces(true, true) {
        info!("Stitched down to {} vertices", mesh.vertex_count());
    }
    mesh.laplacian_smooth(smooth);
    mesh.simplify(simplify, &SimplifyBackend::Quadric(QuadricConfig::default()))?;

    mesh.write_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Wrote {} vertices and {} faces to {}",
        mesh.vertex_count(),
        mesh.face_count(),
        output.display()
    );

    if compress_report {
        let uncompressed = mesh.uncompressed_nbytes();
        let compressed = mesh.compress(CompressionMethod::Lz4);
        println!(
            "uncompressed: {} bytes, lz4: {} bytes ({:.1}%)",
            uncompressed,
            compressed.nbytes(),
            100.0 * compressed.nbytes() as f64 / uncompressed.max(1) as f64
        );
    }
    Ok(())
}

fn run_info(input: &Path) -> Result<()> {
    let mesh = read_any(input)?;
    let report = GeometricAnalysis::analyse_mesh_quality(&mesh);

    println!("{}", input.display());
    println!("  vertices:           {}", report.total_vertices);
    println!("  faces:              {}", report.total_faces);
    println!("  normals:            {}", if mesh.has_normals() { "yes" } else { "no" });
    let bb = report.bounding_box;
    if !bb.is_empty() {
        println!("  bounding box (zyx): {:?} .. {:?}", bb.start, bb.stop);
    }
    println!("  surface area:       {:.3}", report.surface_area);
    println!("  degenerate faces:   {}", report.degenerate_faces);
    println!("  boundary edges:     {}", report.boundary_edges);
    println!("  non-manifold edges: {}", report.non_manifold_edges);
    println!(
        "  aspect ratio:       min {:.3} / mean {:.3} / max {:.3}",
        report.min_aspect_ratio, report.mean_aspect_ratio, report.max_aspect_ratio
    );
    println!("  watertight:         {}", report.is_watertight());
    Ok(())
}
