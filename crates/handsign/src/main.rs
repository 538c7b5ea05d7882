mod overlay;

use std::{fs, path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use handsign::{
    config::SessionConfig,
    control::Controls,
    pipeline::Session,
    video::ImageSequence,
};
use handsign_image::Rect;

/// Tracks a hand through a sequence of frames and classifies its gesture.
///
/// While running, type `t` and Enter to stop tracking and pick up a new region, or `q` and Enter
/// to quit.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Session configuration file.
    #[arg(long, short, env = "HANDSIGN_CONFIG")]
    config: PathBuf,

    /// Directory of frames to process, overriding the configured one.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Directory to write annotated frames to.
    #[arg(long)]
    annotate: Option<PathBuf>,

    /// Initial region as `x,y,width,height`, overriding the configured one.
    #[arg(long, value_parser = parse_region)]
    region: Option<Rect>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Do not read control commands from standard input.
    #[arg(long)]
    no_controls: bool,
}

fn parse_region(s: &str) -> Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid region '{s}': {e}"))?;
    match *parts {
        [x, y, w, h] if w > 0 && h > 0 => Ok(Rect::from_top_left(
            i32::try_from(x).map_err(|e| e.to_string())?,
            i32::try_from(y).map_err(|e| e.to_string())?,
            u32::try_from(w).map_err(|e| e.to_string())?,
            u32::try_from(h).map_err(|e| e.to_string())?,
        )),
        _ => Err(format!(
            "region must be `x,y,width,height` with positive size, got '{s}'"
        )),
    }
}

fn main() {
    handsign::init_logger!();

    if let Err(e) = run(Args::parse()) {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut cfg = SessionConfig::load(&args.config)?;
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if let Some(annotate) = args.annotate {
        cfg.annotate = Some(annotate);
    }
    if let Some(region) = args.region {
        cfg.region = Some(region);
    }
    if let Some(max_frames) = args.max_frames {
        cfg.max_frames = Some(max_frames);
    }

    let mut session = Session::from_config(&cfg)?;
    let source = ImageSequence::open(&cfg.frames)?;
    let mut controls = if args.no_controls {
        Controls::none()
    } else {
        Controls::stdin()?
    };

    if let Some(dir) = &cfg.annotate {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let state = session.run(source, &mut controls, |frame, report| {
        if let Some(dir) = &cfg.annotate {
            let path = dir.join(format!("frame_{:05}.png", report.frame_index));
            overlay::annotate(frame, report).save(&path)?;
        }
        Ok(())
    })?;

    match state.prediction {
        Some(p) => log::info!(
            "final prediction: class {} ({:.1}%)",
            p.class_id,
            p.probability * 100.0
        ),
        None => log::info!("no gesture was classified"),
    }
    Ok(())
}
