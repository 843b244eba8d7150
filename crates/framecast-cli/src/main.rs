//! framecast CLI entrypoint.
//!
//! ```bash
//! framecast probe
//! framecast probe --json
//! framecast convert --config converter.toml --width 1920 --height 1080 --frames 10
//! ```
//!
//! `probe` reports whether a CUDA device is reachable.  `convert` runs
//! synthetic frames through a configured converter and prints per-stage
//! latency — the smoke path for a deployment box.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use framecast_core::context::GpuContext;
use framecast_core::types::{FormatKind, FrameBuffer, FrameDesc, FrameMessage};
use framecast_pipeline::{ConverterConfig, FormatConverter};

#[derive(Parser, Debug)]
#[command(
    name = "framecast",
    version,
    about = "GPU pixel-format conversion stage",
    arg_required_else_help = true,
    after_help = "Examples:\n  framecast probe --json\n  framecast convert --config converter.toml --width 1920 --height 1080 --frames 10"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe CUDA context initialization and print basic status.
    Probe(ProbeArgs),
    /// Run synthetic frames through a configured converter.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// CUDA device ordinal.
    #[arg(short = 'd', long = "device", default_value_t = 0)]
    device: usize,

    /// Emit machine-readable JSON.
    #[arg(long = "json")]
    json: bool,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// TOML file with a [converter] table.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Synthetic input width in pixels.
    #[arg(long = "width", default_value_t = 1920)]
    width: usize,

    /// Synthetic input height in pixels.
    #[arg(long = "height", default_value_t = 1080)]
    height: usize,

    /// Number of frames to push through the converter.
    #[arg(short = 'n', long = "frames", default_value_t = 10)]
    frames: u64,

    /// CUDA device ordinal.
    #[arg(short = 'd', long = "device", default_value_t = 0)]
    device: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => run_probe(args),
        Commands::Convert(args) => run_convert(args),
    }
}

fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    match GpuContext::new(args.device) {
        Ok(_) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "schema_version": 1,
                        "device": args.device,
                        "cuda": "ok",
                    })
                );
            } else {
                println!("CUDA device {} initialized", args.device);
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "schema_version": 1,
                        "device": args.device,
                        "cuda": "unavailable",
                        "error": e.to_string(),
                    })
                );
            } else {
                eprintln!("CUDA device {} unavailable: {e}", args.device);
            }
            bail!("probe failed");
        }
    }
}

fn run_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let config = ConverterConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let in_format = config.in_format.clone();
    let in_tensor_name = config.in_tensor_name.clone();

    let mut converter = FormatConverter::new(config).context("configuring converter")?;
    let ctx = GpuContext::new(args.device).context("initializing CUDA")?;
    converter.start(ctx).context("starting converter")?;

    let in_kind = framecast_pipeline::parse_format(&in_format)?;
    info!(
        frames = args.frames,
        width = args.width,
        height = args.height,
        in_format = in_kind.name(),
        "pushing synthetic frames"
    );

    let mut last = None;
    for _ in 0..args.frames {
        let frame = synthetic_frame(in_kind, args.height, args.width);
        let msg = if in_kind.ingestible_as_video() {
            FrameMessage::from_video(frame)
        } else {
            FrameMessage::from_tensor(in_tensor_name.clone(), frame)
        };
        last = Some(converter.process(msg).context("processing frame")?);
    }

    if let Some(out) = last {
        println!(
            "emitted '{}': {}x{} {} ({} channels, {} bytes)",
            out.name,
            out.tensor.desc.cols,
            out.tensor.desc.rows,
            out.tensor.desc.format.name(),
            out.tensor.desc.channels,
            out.tensor.desc.byte_size(),
        );
    }

    let m = &converter.metrics;
    println!(
        "stage latency over {} frames: staging {:.3} ms, resize {:.3} ms, convert {:.3} ms",
        converter.frames(),
        m.staging.avg_ms(),
        m.resize.avg_ms(),
        m.convert.avg_ms(),
    );

    converter.stop();
    Ok(())
}

/// Host-resident gradient frame in the configured input format.
fn synthetic_frame(kind: FormatKind, rows: usize, cols: usize) -> FrameBuffer {
    let desc = FrameDesc::new(kind, rows, cols, kind.channels());
    let mut data = vec![0u8; desc.byte_size()];

    match kind {
        FormatKind::Rgb888 | FormatKind::Rgba8888 | FormatKind::Uint8 => {
            let ch = desc.channels;
            for y in 0..rows {
                for x in 0..cols {
                    let i = (y * cols + x) * ch;
                    for c in 0..ch {
                        data[i + c] = ((x + y * 3 + c * 85) % 256) as u8;
                    }
                }
            }
        }
        FormatKind::Float32 => {
            for (i, chunk) in data.chunks_exact_mut(4).enumerate() {
                let v = (i % 256) as f32 / 255.0;
                chunk.copy_from_slice(&v.to_ne_bytes());
            }
        }
        FormatKind::Yuv420 | FormatKind::Nv12 => {
            // Luma gradient, chroma drifting around the neutral point.
            let luma = rows * cols;
            for (i, b) in data[..luma].iter_mut().enumerate() {
                *b = (i % 256) as u8;
            }
            for (i, b) in data[luma..].iter_mut().enumerate() {
                *b = 112 + (i % 32) as u8;
            }
        }
    }

    FrameBuffer::from_host(desc, data)
}
