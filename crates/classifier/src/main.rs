//! Frame Classifier - Main Entry Point
//!
//! Streams raw YUV frames from a file through the pipeline and prints each
//! recognition. Stands in for the camera producer and the UI listener.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use classifier::{
    init_logging, interpreter_factory, ClassifierConfig, ModelAssets, PipelineController, Recognition, Submission,
};
use frame_convert::{PixelFormat, RawFrame};
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    I420,
    Nv12,
    Nv21,
}

impl From<FormatArg> for PixelFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::I420 => PixelFormat::I420,
            FormatArg::Nv12 => PixelFormat::Nv12,
            FormatArg::Nv21 => PixelFormat::Nv21,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "frame-classifier", version, about = "Classify raw camera frames with a 224x224 image model")]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File of back-to-back raw frames
    #[arg(short, long)]
    frames: PathBuf,

    /// Frame width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Raw frame layout
    #[arg(long, value_enum, default_value_t = FormatArg::Nv21)]
    format: FormatArg,

    /// Attach a hardware delegate (overrides the config file)
    #[arg(long)]
    accel: bool,

    /// Stop after this many frames (0 = whole file)
    #[arg(long, default_value_t = 0)]
    max_frames: u64,

    /// Print recognitions as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClassifierConfig::load(args.config.as_deref())?;
    init_logging(&config.log_level, config.log_json)?;

    info!("=== Frame Classifier v{} ===", env!("CARGO_PKG_VERSION"));

    let factory = interpreter_factory(&config);
    let assets = ModelAssets::load(&config, factory.as_ref())?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Recognition>();
    let controller = Arc::new(PipelineController::new(assets, factory, &config, tx)?);

    let use_accel = args.accel || config.use_accel;
    controller
        .init(use_accel)
        .await
        .with_context(|| format!("interpreter init failed (accelerated: {})", use_accel))?;

    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(recognition) = rx.recv().await {
            if json {
                println!("{}", serde_json::to_string(&recognition)?);
            } else {
                println!("{}", recognition);
            }
        }
        Ok::<_, serde_json::Error>(())
    });

    let producer = controller.clone();
    let (scheduled, dropped) = tokio::task::spawn_blocking(move || stream_frames(&producer, &args)).await??;
    info!("Submitted {} frames ({} dropped)", scheduled, dropped);

    if let Err(e) = controller.drain().await {
        warn!("Pipeline stopped before all frames were processed: {}", e);
    }
    controller.close();
    drop(controller);

    printer.await??;
    Ok(())
}

/// Read fixed-size frames and feed them through `analyze`
fn stream_frames(controller: &PipelineController, args: &Args) -> Result<(u64, u64)> {
    let format = PixelFormat::from(args.format);
    let frame_len = format.frame_len(args.width, args.height);
    let file = File::open(&args.frames).with_context(|| format!("opening {}", args.frames.display()))?;
    let mut reader = BufReader::new(file);

    info!(
        "Streaming {}x{} {} frames ({} bytes each) from {}",
        args.width,
        args.height,
        format,
        frame_len,
        args.frames.display()
    );

    let (mut scheduled, mut dropped) = (0u64, 0u64);
    let mut sequence = 0u64;
    loop {
        if args.max_frames > 0 && sequence >= args.max_frames {
            info!("Reached frame limit {}", args.max_frames);
            break;
        }

        let mut buf = vec![0u8; frame_len];
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("reading frame"),
        }

        let frame = RawFrame::from_packed(buf, args.width, args.height, format)?
            .with_timestamp(0, sequence)
            .with_release(move || trace!("Frame {} released", sequence));

        match controller.analyze(frame) {
            Submission::Scheduled => scheduled += 1,
            Submission::Dropped(state) => {
                warn!("Frame {} dropped, engine {}", sequence, state);
                dropped += 1;
            }
        }
        sequence += 1;
    }

    Ok((scheduled, dropped))
}
