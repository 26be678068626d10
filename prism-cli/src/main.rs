//! Prism - apply frame filters to still images from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use prism_core::{
    FilterId, FilterPipeline, FilterRegistry, FormatContext, Frame, GpuContext, MemorySettings,
    NoSettings, OptionsResolver, PipelineConfig, SettingsStore,
};

#[derive(Parser, Debug)]
#[command(name = "prism", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List filters by category.
    List,
    /// Run one filter over a single image.
    Apply(ApplyArgs),
    /// Run a multi-frame filter over several images of equal size.
    Combine(CombineArgs),
    /// Print the options a filter would run with.
    Defaults(DefaultsArgs),
}

#[derive(Parser, Debug)]
struct PipelineArgs {
    /// Filter name, e.g. "Gaussian Blur" or gaussian_blur.
    #[arg(long)]
    filter: String,

    /// Settings JSON (flat map of "<filter>.<option>" to value).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Pipeline configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request a GPU device for kernel filters.
    #[arg(long, default_value_t = false)]
    gpu: bool,
}

#[derive(Parser, Debug)]
struct ApplyArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output image; format follows the extension.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct CombineArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Output image.
    #[arg(long)]
    out: PathBuf,

    /// Input images, all the same size.
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
struct DefaultsArgs {
    /// Filter name.
    #[arg(long)]
    filter: String,

    /// Resolve against this settings JSON instead of the built-in defaults.
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prism=info,wgpu=warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::List => cmd_list(),
        Command::Apply(args) => cmd_apply(args),
        Command::Combine(args) => cmd_combine(args),
        Command::Defaults(args) => cmd_defaults(args),
    }
}

fn parse_filter(name: &str) -> anyhow::Result<FilterId> {
    match FilterId::from_name(name) {
        Some(id) => Ok(id),
        None => bail!("unknown filter '{}' (see `prism list`)", name),
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Arc<dyn SettingsStore>> {
    let store: Arc<dyn SettingsStore> = match path {
        Some(path) => Arc::new(
            MemorySettings::load(path).with_context(|| format!("read settings '{}'", path.display()))?,
        ),
        None => Arc::new(NoSettings),
    };
    Ok(store)
}

fn build_pipeline(args: &PipelineArgs) -> anyhow::Result<(FilterPipeline, FilterId)> {
    let id = parse_filter(&args.filter)?;

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("read config '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };

    let gpu = if args.gpu || id.is_gpu_kernel() {
        match GpuContext::blocking() {
            Ok(gpu) => Some(Arc::new(gpu)),
            Err(err) if args.gpu => return Err(err).context("initialize GPU"),
            Err(err) => {
                info!("No GPU available: {}", err);
                None
            }
        }
    } else {
        None
    };

    let registry = FilterRegistry::builtin(config.pool_manager(), gpu);
    let resolver = OptionsResolver::new(load_settings(args.settings.as_deref())?);
    Ok((FilterPipeline::new(Arc::new(registry), resolver, config), id))
}

fn load_frame(path: &Path) -> anyhow::Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("open image '{}'", path.display()))?
        .to_rgba8();
    let format = FormatContext::rgba(image.width(), image.height());
    Ok(Frame::new(format, image.into_raw())?)
}

fn save_frame(frame: &Frame, path: &Path) -> anyhow::Result<()> {
    let format = frame.format();
    let bytes = frame.to_vec()?;
    let image = image::RgbaImage::from_raw(format.width, format.height, bytes)
        .context("output buffer does not match its format")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("write image '{}'", path.display()))?;
    Ok(())
}

fn cmd_list() -> anyhow::Result<()> {
    let registry = FilterRegistry::default();
    for (category, ids) in registry.list_categories() {
        println!("{}", category);
        for id in ids {
            let tag = if id.is_gpu_kernel() {
                " [gpu]"
            } else if id.is_multi_frame() {
                " [multi-frame]"
            } else {
                ""
            };
            println!("  {:<16} {}{}", id.settings_prefix(), id.name(), tag);
        }
    }
    Ok(())
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<()> {
    let (pipeline, id) = build_pipeline(&args.pipeline)?;
    let input = load_frame(&args.in_path)?;

    pipeline.select_filter(id);
    let output = pipeline
        .run_frame(&input, None)
        .with_context(|| format!("run {}", id))?;

    save_frame(&output, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_combine(args: CombineArgs) -> anyhow::Result<()> {
    let (pipeline, id) = build_pipeline(&args.pipeline)?;
    if !id.is_multi_frame() {
        info!("{} only reads the first input", id);
    }
    let frames = args
        .inputs
        .iter()
        .map(|path| load_frame(path.as_path()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let output = pipeline
        .run_frames(&frames, Some(id))
        .with_context(|| format!("run {} over {} frames", id, frames.len()))?;

    save_frame(&output, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_defaults(args: DefaultsArgs) -> anyhow::Result<()> {
    let id = parse_filter(&args.filter)?;
    let resolver = OptionsResolver::new(load_settings(args.settings.as_deref())?);
    let options = resolver.options_for(id);
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(())
}
