//! exattr CLI: run tiled occlusion and FusionGrad on a toy classifier.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn_ndarray::NdArray;
use exattr_core::Seed;
use exattr_explain::{
    AttributionMap, AttributionMethod, AttributionSummary, FusionGrad, FusionGradConfig,
    Occlusion, Target, TiledOcclusion, TiledOcclusionConfig,
};

/// Backend type for attribution runs.
type RunBackend = NdArray;

#[derive(Parser)]
#[command(name = "exattr")]
#[command(author, version)]
#[command(about = "Perturbation-based attribution for Burn models")]
#[command(long_about = "exattr: tiled occlusion and FusionGrad attribution.

Runs an attribution method on a randomly initialised linear classifier over
a synthetic input and prints summary statistics of the resulting map as JSON.

EXAMPLES:
  # Tiled occlusion on a 1x10x10 image
  exattr tiled --dims 1,1,10,10 --window 1,4,4 --k 1,2,2

  # Same, averaged over weight and input noise
  exattr fusion --dims 1,1,10,10 --window 1,4,4 --k 1,2,2 --n 4 --m 4

  # Read method settings from JSON
  exattr fusion --tiled-config tiled.json --fusion-config fusion.json")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tiled occlusion attribution
    Tiled {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        tiled: TiledArgs,
    },
    /// FusionGrad over tiled occlusion
    Fusion {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        tiled: TiledArgs,

        #[command(flatten)]
        fusion: FusionArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Input dimensions, batch first (2 to 5 values)
    #[arg(long, value_delimiter = ',', default_value = "1,1,10,10", value_name = "DIMS")]
    dims: Vec<usize>,

    /// Number of classifier outputs
    #[arg(long, default_value = "10", value_name = "N")]
    classes: usize,

    /// Output index to explain
    #[arg(long, default_value = "0", value_name = "INDEX")]
    target: usize,

    /// Seed for the input, the model and the noise
    #[arg(long, default_value = "42", value_name = "SEED")]
    seed: u64,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct TiledArgs {
    /// Occlusion window per feature axis
    #[arg(long, value_delimiter = ',', value_name = "SIZES")]
    window: Option<Vec<usize>>,

    /// Upscale factor per feature axis
    #[arg(long, value_delimiter = ',', value_name = "FACTORS")]
    k: Option<Vec<usize>>,

    /// Replacement value for occluded elements
    #[arg(long, value_name = "VALUE")]
    baseline: Option<f32>,

    /// JSON file with tiled occlusion settings
    #[arg(long, value_name = "FILE")]
    tiled_config: Option<PathBuf>,
}

#[derive(Args)]
struct FusionArgs {
    /// Number of weight noise samples
    #[arg(long, value_name = "N")]
    n: Option<usize>,

    /// Number of input noise samples per weight sample
    #[arg(long, value_name = "M")]
    m: Option<usize>,

    /// Standard deviation of the weight noise
    #[arg(long, value_name = "STD")]
    std: Option<f32>,

    /// Standard deviation of the input noise
    #[arg(long, value_name = "STD")]
    sg_std: Option<f32>,

    /// JSON file with FusionGrad settings
    #[arg(long, value_name = "FILE")]
    fusion_config: Option<PathBuf>,
}

/// Linear classifier over the flattened input.
#[derive(Module, Debug)]
struct ToyClassifier<B: Backend> {
    linear: Linear<B>,
}

impl<B: Backend> ToyClassifier<B> {
    fn new(features: usize, classes: usize, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(features, classes).init(device),
        }
    }

    fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, 2> {
        let dims = x.dims();
        let features: usize = dims[1..].iter().product();
        self.linear.forward(x.reshape([dims[0], features]))
    }
}

/// What a run prints.
#[derive(Serialize)]
struct RunReport {
    input: Vec<usize>,
    target: Target,
    forward_calls: usize,
    tiled: TiledOcclusionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    fusion: Option<FusionGradConfig>,
    summary: AttributionSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let (input, report) = match cli.command {
        Commands::Tiled { input, tiled } => {
            let tiled = tiled_config(&tiled, input.quiet)?;
            let report = dispatch(&input, tiled, None)?;
            (input, report)
        }
        Commands::Fusion {
            input,
            tiled,
            fusion,
        } => {
            // The inner runs are counted by the FusionGrad bar.
            let tiled = tiled_config(&tiled, true)?;
            let fusion = fusion_config(&fusion, input.seed, input.quiet)?;
            let report = dispatch(&input, tiled, Some(fusion))?;
            (input, report)
        }
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &input.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn tiled_config(args: &TiledArgs, quiet: bool) -> Result<TiledOcclusionConfig> {
    let mut config = match &args.tiled_config {
        Some(path) => TiledOcclusionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => TiledOcclusionConfig::default(),
    };
    if let Some(window) = &args.window {
        config.window = window.clone();
    }
    if let Some(k) = &args.k {
        config.k = k.clone();
    }
    if let Some(baseline) = args.baseline {
        config.baseline = baseline;
    }
    Ok(config.with_show_progress(!quiet))
}

fn fusion_config(args: &FusionArgs, seed: u64, quiet: bool) -> Result<FusionGradConfig> {
    let mut config = match &args.fusion_config {
        Some(path) => FusionGradConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => FusionGradConfig::default(),
    };
    if let Some(n) = args.n {
        config.n = n;
    }
    if let Some(m) = args.m {
        config.m = m;
    }
    if let Some(std) = args.std {
        config.std = std;
    }
    if let Some(sg_std) = args.sg_std {
        config.sg_std = sg_std;
    }
    if config.seed.is_none() {
        config.seed = Some(seed);
    }
    config.validate()?;
    Ok(config.with_show_progress(!quiet))
}

fn dispatch(
    input: &InputArgs,
    tiled: TiledOcclusionConfig,
    fusion: Option<FusionGradConfig>,
) -> Result<RunReport> {
    match input.dims.len() {
        2 => run::<2>(input, tiled, fusion),
        3 => run::<3>(input, tiled, fusion),
        4 => run::<4>(input, tiled, fusion),
        5 => run::<5>(input, tiled, fusion),
        n => bail!("Expected 2 to 5 input dimensions (batch first), got {n}"),
    }
}

fn run<const D: usize>(
    args: &InputArgs,
    tiled: TiledOcclusionConfig,
    fusion: Option<FusionGradConfig>,
) -> Result<RunReport> {
    let dims: [usize; D] = args
        .dims
        .clone()
        .try_into()
        .map_err(|dims: Vec<usize>| anyhow!("Invalid input dimensions {dims:?}"))?;
    // Reject bad settings before building anything.
    let plan = tiled.plan(&dims)?;
    tracing::info!(
        "Input {:?}, {} sweeps, steps {:?}",
        dims,
        plan.sweep_count(),
        plan.steps()
    );

    let device = Default::default();
    let seed = Seed::new(args.seed);
    <RunBackend as Backend>::seed(seed.derive("model").value());

    let features: usize = dims[1..].iter().product();
    let mut model = ToyClassifier::<RunBackend>::new(features, args.classes, &device);
    let input = synthetic_input::<RunBackend, D>(dims, seed, &device);
    let target = Target::Class(args.target);

    let (values, method, forward_calls) = match &fusion {
        None => {
            let mut runner = TiledOcclusion::new(
                Occlusion::new(|x: Tensor<RunBackend, D>| model.forward(x)),
                tiled.clone(),
            );
            let values = runner.attribute(&input, &target)?;
            let calls = runner.primitive().evaluations();
            (values, AttributionMethod::TiledOcclusion, calls)
        }
        Some(config) => {
            let mut calls = 0;
            let values = {
                let method = |model: &ToyClassifier<RunBackend>,
                              x: Tensor<RunBackend, D>,
                              target: &Target|
                 -> exattr_explain::Result<Tensor<RunBackend, D>> {
                    let mut runner = TiledOcclusion::new(
                        Occlusion::new(|x: Tensor<RunBackend, D>| model.forward(x)),
                        tiled.clone(),
                    );
                    let values = runner.attribute(&x, target)?;
                    calls += runner.primitive().evaluations();
                    Ok(values)
                };
                FusionGrad::new(method, config.clone()).attribute(&mut model, &input, &target)?
            };
            (values, AttributionMethod::FusionGrad, calls)
        }
    };

    let summary = AttributionMap::new(values, method)
        .with_target(target.clone())
        .summary()?;

    Ok(RunReport {
        input: dims.to_vec(),
        target,
        forward_calls,
        tiled,
        fusion,
        summary,
    })
}

/// Uniform values in [0, 1).
fn synthetic_input<B: Backend, const D: usize>(
    dims: [usize; D],
    seed: Seed,
    device: &B::Device,
) -> Tensor<B, D> {
    let mut rng = seed.derive("input").to_rng();
    let values: Vec<f32> = (0..dims.iter().product::<usize>())
        .map(|_| rng.gen::<f32>())
        .collect();
    Tensor::from_data(TensorData::new(values, dims), device)
}
