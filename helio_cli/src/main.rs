// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};

use helio::align::{
    AlignmentEvent, AlignmentInput, AlignmentJob, AlignmentMethod, AlignmentParams, CropMode,
};
use helio::batch::{BatchEvent, BatchJob, BatchParams};
use helio::config::CoreConfig;
use helio::io::OutputFormat;
use helio::math::gaussian::ConvolutionMethod;

#[derive(Parser)]
#[command(version, about = "Post-processing and alignment of astronomical image stacks")]
struct Opt {
    /// Optional TOML configuration file.
    #[clap(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a settings file to a list of images and save the outputs.
    Process {
        /// Input image files (BMP/TIFF/PNG/FITS).
        #[clap(required = true)]
        inputs: Vec<PathBuf>,

        /// Processing settings file (XML).
        #[clap(long, short)]
        settings: PathBuf,

        /// Directory receiving the `{name}_out` files.
        #[clap(long, short, default_value = ".")]
        output_dir: PathBuf,

        /// Output file format.
        #[clap(long, short, value_enum, default_value = "tiff16")]
        format: FormatArg,
    },
    /// Align an image sequence.
    Align {
        /// Input image files, in sequence order.
        #[clap(required = true)]
        inputs: Vec<PathBuf>,

        /// Alignment method.
        #[clap(long, short, value_enum, default_value = "phase-correlation")]
        method: MethodArg,

        /// Output canvas selection.
        #[clap(long, value_enum, default_value = "intersection")]
        crop: CropArg,

        /// Disable sub-pixel alignment of output images.
        #[clap(long)]
        no_subpixel: bool,

        /// Directory receiving the aligned files.
        #[clap(long, short, default_value = ".")]
        output_dir: PathBuf,

        /// Suffix appended to each output file's stem.
        #[clap(long, default_value = "_aligned")]
        suffix: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Bmp8,
    #[cfg(feature = "png-format")]
    Png8,
    Tiff8,
    Tiff16,
    Tiff32f,
    Fits8,
    Fits16,
    Fits32f,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> OutputFormat {
        match f {
            FormatArg::Bmp8 => OutputFormat::Bmp8,
            #[cfg(feature = "png-format")]
            FormatArg::Png8 => OutputFormat::Png8,
            FormatArg::Tiff8 => OutputFormat::Tiff8,
            FormatArg::Tiff16 => OutputFormat::Tiff16,
            FormatArg::Tiff32f => OutputFormat::Tiff32F,
            FormatArg::Fits8 => OutputFormat::Fits8,
            FormatArg::Fits16 => OutputFormat::Fits16,
            FormatArg::Fits32f => OutputFormat::Fits32F,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    PhaseCorrelation,
    Limb,
}

#[derive(Clone, Copy, ValueEnum)]
enum CropArg {
    Intersection,
    Pad,
}

/// Configuration file contents; every knob is optional.
#[derive(Default, serde::Deserialize)]
struct ConfigFile {
    max_processing_requests_per_sec: Option<u32>,
    tone_curve_lut_size: Option<usize>,
    normalize_fits_values: Option<bool>,
    convolution_method: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig> {
    let mut config = CoreConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };
    let text = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&text)?;
    if let Some(v) = file.max_processing_requests_per_sec {
        config.max_processing_requests_per_sec = v;
    }
    if let Some(v) = file.tone_curve_lut_size {
        config.tone_curve_lut_size = v;
    }
    if let Some(v) = file.normalize_fits_values {
        config.normalize_fits_values = v;
    }
    if let Some(v) = file.convolution_method {
        config.convolution_method = match v.as_str() {
            "auto" => ConvolutionMethod::Auto,
            "standard" => ConvolutionMethod::Standard,
            "young-van-vliet" => ConvolutionMethod::YoungVanVliet,
            other => return Err(eyre!("unknown convolution method: {other}")),
        };
    }
    Ok(config)
}

fn run_process(
    inputs: Vec<PathBuf>,
    settings: PathBuf,
    output_dir: PathBuf,
    format: FormatArg,
    config: CoreConfig,
) -> Result<()> {
    let total = inputs.len();
    let params = BatchParams {
        input_files: inputs,
        settings_file: settings,
        output_dir,
        output_format: format.into(),
    };

    let job = BatchJob::start(params, config);
    let mut failures = 0usize;
    for event in job.events().iter() {
        match event {
            BatchEvent::FileStarted { index } => {
                println!("[{}/{}] processing...", index + 1, total);
            }
            BatchEvent::FileDone { index, output } => {
                println!("[{}/{}] saved {}", index + 1, total, output.display());
            }
            BatchEvent::FileError { index, message } => {
                eprintln!("[{}/{}] error: {message}", index + 1, total);
                failures += 1;
            }
            BatchEvent::Completed => break,
            BatchEvent::Aborted => return Err(eyre!("batch processing aborted")),
        }
    }
    job.join();

    if failures > 0 {
        Err(eyre!("{failures} of {total} files failed"))
    } else {
        Ok(())
    }
}

fn run_align(
    inputs: Vec<PathBuf>,
    method: MethodArg,
    crop: CropArg,
    no_subpixel: bool,
    output_dir: PathBuf,
    suffix: String,
    config: CoreConfig,
) -> Result<()> {
    let mut params = AlignmentParams::new(AlignmentInput::Files(inputs));
    params.method = match method {
        MethodArg::PhaseCorrelation => AlignmentMethod::PhaseCorrelation,
        MethodArg::Limb => AlignmentMethod::Limb,
    };
    params.crop_mode = match crop {
        CropArg::Intersection => CropMode::CropToIntersection,
        CropArg::Pad => CropMode::PadToBoundingBox,
    };
    params.subpixel_alignment = !no_subpixel;
    params.output_dir = output_dir;
    params.output_file_suffix = suffix;
    params.normalize_fits_values = config.normalize_fits_values;

    let job = AlignmentJob::start(params);
    for event in job.events().iter() {
        match event {
            AlignmentEvent::PhaseCorrImgTranslation { index, translation } => {
                println!(
                    "frame {index}: translation ({:.2}, {:.2})",
                    translation.0, translation.1
                );
            }
            AlignmentEvent::SavedOutputImage { index } => {
                println!("frame {index}: saved");
            }
            AlignmentEvent::LimbFoundDiscRadius { index, radius } => {
                println!("frame {index}: disc radius {radius:.1}");
            }
            AlignmentEvent::LimbUsingRadius { radius } => {
                println!("using average disc radius {radius:.1}");
            }
            AlignmentEvent::LimbStabilizationProgress { index } => {
                println!("stabilization: frame {index}");
            }
            AlignmentEvent::LimbStabilizationFailure { message } => {
                eprintln!("stabilization skipped: {message}");
            }
            AlignmentEvent::Completed => {
                println!("alignment completed");
                break;
            }
            AlignmentEvent::Aborted { message, .. } => {
                job.join();
                return Err(eyre!("alignment aborted: {message}"));
            }
        }
    }
    job.join();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    #[cfg(feature = "tracing-subscriber")]
    {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .init();
    }

    let opt = Opt::parse();
    let config = load_config(opt.config.as_ref())?;

    match opt.command {
        Command::Process {
            inputs,
            settings,
            output_dir,
            format,
        } => run_process(inputs, settings, output_dir, format, config),
        Command::Align {
            inputs,
            method,
            crop,
            no_subpixel,
            output_dir,
            suffix,
        } => run_align(inputs, method, crop, no_subpixel, output_dir, suffix, config),
    }
}
