//! Stack a synthetic drifting star field and report alignment accuracy and timing.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use starstack::test_util::{SyntheticField, SyntheticStar};
use starstack::{EdgePolicy, FailurePolicy, StackConfig, StackPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Frames in the synthetic sequence
    #[arg(long, default_value_t = 8)]
    frames: usize,

    /// Frame width and height in pixels
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Number of stars in the field
    #[arg(long, default_value_t = 15)]
    stars: usize,

    /// Pointing drift per frame in pixels (x; y drifts at half rate)
    #[arg(long, default_value_t = 0.7)]
    drift: f64,

    /// Random pointing jitter per frame in pixels
    #[arg(long, default_value_t = 0.2)]
    jitter: f64,

    /// Sky noise standard deviation
    #[arg(long, default_value_t = 5.0)]
    noise: f64,

    /// Point-source FWHM in pixels
    #[arg(long, default_value_t = 3.0)]
    fwhm: f64,

    /// Random seed for the field and noise
    #[arg(long, default_value_t = 7)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = EdgePolicy::Clamp)]
    edge_policy: EdgePolicy,

    #[arg(long, value_enum, default_value_t = FailurePolicy::Exclude)]
    on_frame_failure: FailurePolicy,

    /// Stack frames unshifted, without registration
    #[arg(long, default_value_t = false)]
    no_align: bool,

    /// Worker thread cap
    #[arg(long)]
    threads: Option<usize>,

    /// Load the stacking configuration from a JSON file instead
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn build_field(args: &Args, rng: &mut StdRng) -> SyntheticField {
    let margin = (args.size as f64 * 0.1).max(8.0);
    let span = args.size as f64 - 2.0 * margin;
    let stars = (0..args.stars)
        .map(|_| SyntheticStar {
            x: margin + rng.gen::<f64>() * span,
            y: margin + rng.gen::<f64>() * span,
            peak: rng.gen_range(300.0..3000.0),
        })
        .collect();

    SyntheticField::new((args.size, args.size), stars)
        .with_noise(args.noise)
        .with_fwhm(args.fwhm)
}

fn check_args(args: &Args) -> anyhow::Result<()> {
    if !(args.jitter.is_finite() && args.jitter >= 0.0) {
        anyhow::bail!("--jitter must be a non-negative number of pixels, got {}", args.jitter);
    }
    Ok(())
}

/// Pointing of frame `index` relative to the reference, the first frame after `skip`.
fn shift_from_reference(shifts: &[(f64, f64)], skip: usize, index: usize) -> (f64, f64) {
    let (rx, ry) = shifts.get(skip).copied().unwrap_or_default();
    let (sx, sy) = shifts[index];
    (sx - rx, sy - ry)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    check_args(&args)?;

    let config = match &args.config {
        Some(path) => StackConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StackConfig {
            nframes: args.frames,
            align: !args.no_align,
            fwhm: args.fwhm,
            edge_policy: args.edge_policy,
            on_frame_failure: args.on_frame_failure,
            max_threads: args.threads,
            ..Default::default()
        },
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let field = build_field(&args, &mut rng);
    let shifts: Vec<(f64, f64)> = (0..args.frames)
        .map(|i| {
            if i == 0 {
                return (0.0, 0.0);
            }
            let step = i as f64 * args.drift;
            (
                step + rng.gen_range(-args.jitter..=args.jitter),
                0.5 * step + rng.gen_range(-args.jitter..=args.jitter),
            )
        })
        .collect();

    let render_start = Instant::now();
    let frames = field.sequence(&shifts, args.seed);
    let render_time = render_start.elapsed();

    let mut pipeline = StackPipeline::new(config)?;
    let stack_start = Instant::now();
    let output = pipeline.run(&frames)?;
    let stack_time = stack_start.elapsed();

    if let Some(path) = &args.report {
        output
            .report
            .save_to_file(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    if args.json {
        println!("{}", output.report.to_json()?);
        return Ok(());
    }

    println!("{}", output.report.generate_human_report());

    println!("## Alignment Error\n");
    println!("| Frame | True dx | True dy | Error (px) |");
    println!("|-------|---------|---------|------------|");
    let mut worst: f64 = 0.0;
    for entry in &output.report.offsets {
        let (tx, ty) = shift_from_reference(&shifts, pipeline.config().skip, entry.frame_index);
        let error = ((entry.dx - tx).powi(2) + (entry.dy - ty).powi(2)).sqrt();
        worst = worst.max(error);
        println!("| {} | {tx:+.3} | {ty:+.3} | {error:.4} |", entry.frame_index);
    }

    println!("\n## Timing\n");
    println!("- Frames: {} of {}x{} pixels", frames.len(), args.size, args.size);
    println!("- Render: {:.1} ms", render_time.as_secs_f64() * 1000.0);
    println!(
        "- Stack: {:.1} ms ({:.2} ms/frame)",
        stack_time.as_secs_f64() * 1000.0,
        stack_time.as_secs_f64() * 1000.0 / frames.len().max(1) as f64
    );
    println!("- Worst alignment error: {worst:.4} px");

    Ok(())
}
