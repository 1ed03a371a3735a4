//! Virtual desktop screenshot tool for wlgrab.
//!
//! Takes a screenshot of a synthetic desktop with the same options a real
//! capture accepts, writes the image, and optionally checks marker pixels
//! painted on the desktop:
//!
//!   vdesktop-test --preset rotated -t ppm out.ppm
//!   vdesktop-test --preset hidpi -g "600,50 400x300" -s 2 --verify -
//!   vdesktop-test --preset toplevel -T vdesktop-window --report report.json

use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use wlgrab_capture_engine::{take_screenshot, HeapAllocator, ScreenshotRequest};
use wlgrab_common::config::AppConfig;
use wlgrab_platform_core::LogicalBox;
use wlgrab_platform_linux::paths::{resolve_output_target, OutputTarget};
use wlgrab_render_engine::{encode_canvas, EncodeOptions, ImageFormat};

mod synthetic;
mod verify;

use synthetic::Preset;
use verify::TestStatus;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Set the output image's scale factor
    #[arg(short = 's', long)]
    scale: Option<f64>,

    /// Region to capture, "<x>,<y> <width>x<height>", or "-" to read it from stdin
    #[arg(short = 'g', long)]
    geometry: Option<String>,

    /// Output image type: png, ppm or jpeg
    #[arg(short = 't', long)]
    filetype: Option<String>,

    /// JPEG quality (0-100)
    #[arg(short = 'q', long)]
    quality: Option<u8>,

    /// PNG compression level (0-9)
    #[arg(short = 'l', long)]
    level: Option<u8>,

    /// Capture a single output by name
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Capture a single toplevel by identifier
    #[arg(short = 'T', long)]
    toplevel: Option<String>,

    /// Include the cursor
    #[arg(short = 'c', long)]
    cursor: bool,

    /// Synthetic desktop layout
    #[arg(long, value_enum, default_value_t = Preset::Dual)]
    preset: Preset,

    /// Check marker pixels and fail on mismatch
    #[arg(long)]
    verify: bool,

    /// Write a JSON verification report (implies --verify)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Output file, "-" for stdout. Defaults to a timestamped name.
    output_file: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load();
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    wlgrab_common::logging::init_logging(&config.logging);

    let format: ImageFormat = match args.filetype.as_deref() {
        Some(name) => name.parse()?,
        None => config.output.format.parse()?,
    };
    if args.quality.is_some() && format != ImageFormat::Jpeg {
        bail!("quality is used only for jpeg image type");
    }
    if args.level.is_some() && format != ImageFormat::Png {
        bail!("compression level is used only for png image type");
    }
    let options = EncodeOptions {
        png_level: args.level.unwrap_or(config.output.png_level),
        jpeg_quality: args.quality.unwrap_or(config.output.jpeg_quality),
    };
    options.validate()?;

    let region = match args.geometry.as_deref() {
        Some("-") => Some(read_geometry(std::io::stdin().lock())?),
        Some(geometry) => Some(geometry.parse::<LogicalBox>()?),
        None => None,
    };

    let request = ScreenshotRequest {
        region,
        output_name: args.output.clone(),
        toplevel: args.toplevel.clone(),
        scale: args.scale.or(config.capture.scale),
        with_cursor: args.cursor || config.capture.with_cursor,
    };

    tracing::info!(preset = ?args.preset, ?request, "Capturing synthetic desktop");

    let mut scene = args.preset.build();
    let shot = take_screenshot(&request, &mut scene.compositor, &mut HeapAllocator::new())?;

    let target = resolve_output_target(
        args.output_file.as_deref(),
        format.extension(),
        config.output.directory.as_deref(),
    );
    match target {
        OutputTarget::Stdout => encode_canvas(&shot.canvas, format, &options, std::io::stdout().lock())?,
        OutputTarget::File(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            encode_canvas(&shot.canvas, format, &options, BufWriter::new(file))?;
            tracing::info!(path = %path.display(), "Screenshot written");
        }
    }

    if args.verify || args.report.is_some() {
        let markers = if request.toplevel.is_some() {
            &scene.window_markers
        } else {
            &scene.desktop_markers
        };
        let report = verify::build_report(args.preset, &shot, markers);
        if let Some(path) = args.report.as_deref() {
            verify::write_report(path, &report)?;
        }
        if report.overall_status == TestStatus::Fail {
            bail!("marker verification failed for preset {:?}", args.preset);
        }
    }

    Ok(())
}

/// Read a geometry line, as printed by region selection tools.
fn read_geometry(mut input: impl BufRead) -> Result<LogicalBox> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read a geometry from stdin")?;
    Ok(line.trim().parse()?)
}
