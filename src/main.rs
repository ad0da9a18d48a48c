use clap::{Parser, Subcommand};
use image_with_info::config::{self, NodeConfig};
use image_with_info::imaging::{Quality, TableRevision};
use image_with_info::{DirectoryHost, Host, Loader, SaveRequest, Saver, TargetFormat, nodes, output};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "image-with-info")]
#[command(about = "Load and save images together with their metadata")]
#[command(long_about = "\
Load and save images together with their metadata

The loader reads pixels, an inverted alpha mask and what the file says about
itself: DPI, EXIF, dimensions, size and format. The saver writes images back
with DPI and EXIF re-embedded, choosing encoder settings from a versioned
decision table.

Directory layout:

  input/                 # Files offered to the loader ('list')
  output/                # Saved images
  output/PNG/            # always_save_png copies (v2)
  config.toml            # Optional, see 'gen-config'

References may carry a host annotation selecting the directory:
  'cat.png'            → input/cat.png
  'cat.png [output]'   → output/cat.png
  'cat.png [temp]'     → temp/cat.png

Run 'image-with-info gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory images are loaded from (overrides config)
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Directory images are saved to (overrides config)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Decision table revision (overrides config)
    #[arg(long, global = true)]
    revision: Option<TableRevision>,

    /// Log debug detail (skipped frames, defaulted metadata, dropped EXIF)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load an image and print its metadata as JSON
    Load {
        /// Image reference, resolved against the input directory
        image: String,
        /// Human-readable summary instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Load an image and save it again in another format
    Save(SaveArgs),
    /// Print the SHA-256 content fingerprint of an image
    Fingerprint { image: String },
    /// Check that an image reference resolves to a file
    Validate { image: String },
    /// List the images available as loader input
    List,
    /// Print the node descriptors as JSON
    Nodes {
        /// Socket summary instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct SaveArgs {
    /// Image reference, resolved against the input directory
    image: String,
    /// Output name without extension (default: the input's name)
    #[arg(long)]
    filename: Option<String>,
    /// Target format: original, avif, webp, jpg, png or tiff
    #[arg(long, default_value = "original")]
    format: TargetFormat,
    /// Encoding used for 'original' (default: the input's format)
    #[arg(long)]
    original_format: Option<String>,
    /// Quality 0-100; meaning depends on format and revision
    #[arg(long, default_value_t = 100)]
    quality: u32,
    /// DPI to stamp (default: the input's DPI)
    #[arg(long)]
    dpi: Option<u32>,
    /// EXIF JSON object (default: the input's EXIF)
    #[arg(long)]
    exif: Option<String>,
    /// Also write a PNG copy under the archive directory (v2)
    #[arg(long)]
    always_save_png: bool,
    /// Do not register outputs for preview
    #[arg(long)]
    no_preview: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "image_with_info=debug"
    } else {
        "image_with_info=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<NodeConfig, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(dir) = &cli.input_dir {
        config.paths.input_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(revision) = cli.revision {
        config.revision = revision;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = resolve_config(cli)?;
    let host = DirectoryHost::from_config(&config.paths);
    let loader = Loader::new(&host, &config);

    match &cli.command {
        Command::Load { image, summary } => {
            let loaded = loader.load(image)?;
            if *summary {
                output::print_load_output(&loaded);
            } else {
                let json = serde_json::json!({
                    "metadata": loaded.metadata,
                    "frames": loaded.frame_count(),
                    "diagnostics": loaded.diagnostics,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Command::Save(args) => {
            let loaded = loader.load(&args.image)?;
            let meta = &loaded.metadata;
            let request = SaveRequest {
                filename: args.filename.clone().unwrap_or_else(|| meta.filename.clone()),
                format: args.format,
                original_format: args
                    .original_format
                    .clone()
                    .unwrap_or_else(|| meta.format.clone()),
                quality: Quality::new(args.quality),
                dpi: args.dpi.unwrap_or(meta.dpi),
                exif: args.exif.clone().unwrap_or_else(|| meta.upright_exif_json()),
                always_save_png: args.always_save_png,
                image_preview: !args.no_preview,
                frames: loaded.frames,
                ..Default::default()
            };
            let outcome = Saver::new(&host, &config).save(&request)?;
            output::print_save_output(&outcome);
        }
        Command::Fingerprint { image } => {
            println!("{}", loader.fingerprint(image)?);
        }
        Command::Validate { image } => {
            loader.validate(image)?;
            println!("OK {}", image);
        }
        Command::List => {
            let names = host.list_inputs()?;
            output::print_input_list(host.input_dir(), &names);
        }
        Command::Nodes { summary } => {
            let registry = nodes::registry(&host.list_inputs()?);
            if *summary {
                for line in output::format_node_list(&registry) {
                    println!("{}", line);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&registry)?);
            }
        }
        Command::GenConfig => {}
    }

    Ok(())
}
