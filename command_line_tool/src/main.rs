use clap::{Parser, Subcommand};

use std::path::{Path, PathBuf};
use std::process;

use warpmap::error::WarpError;
use warpmap::feature_map::FeatureMap;
use warpmap::feature_matcher::{CandidateMode, MatcherParams, MultiresolutionFeatureMatcher};
use warpmap::registration::{ElasticGridRegistration, RegistrationParams};
use warpmap::warp_io;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "CLI for computing periodic warp grids between two materials.")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a warp grid to two feature point sets by elastic registration.
    Register(RegisterArgs),

    /// Grow a warp grid from two grayscale feature maps by multiresolution
    /// matching.
    Design(DesignArgs),
}

#[derive(clap::Args, Debug)]
struct RegisterArgs {
    /// Source feature point file (first material)
    source: String,

    /// Target feature point file (second material)
    target: String,

    /// Warp grid side length
    #[arg(long, default_value_t = 128)]
    grid_size: usize,

    /// Interior smoothness weight
    #[arg(long, default_value_t = 200.0)]
    alpha: f64,

    /// Periodic boundary coupling weight
    #[arg(long, default_value_t = 4000.0)]
    beta: f64,

    /// Number of fit/advect iterations
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Nearest neighbors per correspondence query
    #[arg(long, default_value_t = 10)]
    neighbors: usize,

    /// Output grid file (defaults to warp_<source>_<target>.txt)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Diagnostic wireframe image (defaults to warp_<source>_<target>.png)
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DesignArgs {
    /// Shape guide image (low-detail feature map of the first material)
    shape_map: String,

    /// Style guide image (high-detail feature map of the second material)
    style_map: String,

    /// Distortion penalty weight
    #[arg(long, default_value_t = 0.1)]
    alpha: f64,

    /// Final grid side length (power of two, at least 8)
    #[arg(long, default_value_t = 64)]
    output_size: usize,

    /// Enumerate candidates as fixed half-cell deltas instead of neighbor
    /// midpoints
    #[arg(long)]
    fixed_deltas: bool,

    /// Output grid file (defaults to warp_TD_<shape>_<style>_<alpha>.txt)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Diagnostic wireframe image (defaults to warp_TD_<shape>_<style>_<alpha>.png)
    #[arg(long)]
    image: Option<PathBuf>,

    /// Optional raster with the grid coordinates packed into the red/green
    /// channels
    #[arg(long)]
    channels: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = match args.command {
        Command::Register(register) => run_register(register),
        Command::Design(design) => run_design(design),
    };

    if let Err(err) = result {
        eprintln!("Err: {err}");
        process::exit(1);
    }
    println!("Done.");
}

fn run_register(args: RegisterArgs) -> Result<(), WarpError> {
    let source = warp_io::read_point_set(Path::new(&args.source))?;
    let target = warp_io::read_point_set(Path::new(&args.target))?;

    let params = RegistrationParams {
        grid_size: args.grid_size,
        alpha: args.alpha,
        beta: args.beta,
        iterations: args.iterations,
        neighbors: args.neighbors,
    };
    let result = ElasticGridRegistration::new(source, target, params)?.run()?;

    let base = format!("warp_{}_{}", file_stem(&args.source), file_stem(&args.target));
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{base}.txt")));
    warp_io::write_grid_text(&output, &result.grid)?;

    let image = args
        .image
        .unwrap_or_else(|| PathBuf::from(format!("{base}.png")));
    save_raster(warp_io::wireframe_image(&result.grid, 1024, 1024), &image);

    Ok(())
}

fn run_design(args: DesignArgs) -> Result<(), WarpError> {
    let shape_guide = read_feature_map(&args.shape_map)?;
    let style_guide = read_feature_map(&args.style_map)?;

    let params = MatcherParams {
        alpha: args.alpha,
        output_size: args.output_size,
        mode: if args.fixed_deltas {
            CandidateMode::FixedDeltas
        } else {
            CandidateMode::NeighborMidpoints
        },
    };
    let grid = MultiresolutionFeatureMatcher::new(shape_guide, style_guide, params)?.run()?;

    let base = format!(
        "warp_TD_{}_{}_{:.2}",
        file_stem(&args.shape_map),
        file_stem(&args.style_map),
        args.alpha
    );
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{base}.txt")));
    warp_io::write_grid_text(&output, &grid)?;

    let image = args
        .image
        .unwrap_or_else(|| PathBuf::from(format!("{base}.png")));
    save_raster(warp_io::wireframe_image(&grid, 1024, 1024), &image);

    if let Some(channels) = args.channels {
        save_raster(warp_io::channel_image(&grid), &channels);
    }

    Ok(())
}

/// Loads a grayscale feature map, flipped vertically so image rows match
/// texture space (y up).
fn read_feature_map(filename: &str) -> Result<FeatureMap, WarpError> {
    println!("Reading image file: {filename}");
    let img = image::open(filename)
        .map_err(|e| WarpError::MalformedInput(format!("could not load image {filename}: {e}")))?;
    let gray = image::imageops::flip_vertical(&img.to_luma8());
    FeatureMap::from_luma8(gray.as_raw(), gray.width() as usize, gray.height() as usize)
}

fn save_raster(raster: warp_io::Raster, path: &Path) {
    println!("Writing image {}", path.display());
    let img = image::RgbaImage::from_raw(
        raster.width as u32,
        raster.height as u32,
        raster.pixels,
    )
    .unwrap();
    img.save(path).unwrap();
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
