// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Batch processing: applies a settings file to a list of inputs and writes
//! the outputs. Per-file failures are reported and the run continues.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, clamp_mono32f};
use crate::io::{self, OutputFormat};
use crate::pipeline::ProcessingSettings;
use crate::proc::{lr, normalize, unsharp};
use crate::settings::load_settings;
use crate::worker::{CancelToken, CompletionStatus};

pub struct BatchParams {
    pub input_files: Vec<PathBuf>,
    pub settings_file: PathBuf,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
}

/// Per-file progress of a batch run.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchEvent {
    FileStarted { index: usize },
    FileDone { index: usize, output: PathBuf },
    FileError { index: usize, message: String },
    Completed,
    Aborted,
}

/// Runs the whole pipeline over a full image, with the precise tone curve.
pub fn process_image(
    img: &Image,
    settings: &ProcessingSettings,
    config: &CoreConfig,
    cancel: &CancelToken,
) -> Result<Image> {
    assert_eq!(img.format(), PixelFormat::Mono32F);
    let (w, h) = (img.width() as usize, img.height() as usize);

    // Sharpening.
    let mut sharpened = Image::new(img.width(), img.height(), PixelFormat::Mono32F)?;
    if settings.lucy_richardson.is_effective() {
        let deringing = settings.lucy_richardson.deringing;
        let mut input_px = img.pixels::<f32>().to_vec();
        if deringing.enabled {
            let mut tmp = vec![0.0f32; w * h];
            lr::blur_threshold_vicinity(
                img.pixels::<f32>(),
                w,
                h,
                &mut tmp,
                deringing.threshold,
                deringing.greater_than,
                deringing.sigma,
            );
            input_px = tmp;
        }
        let status = lr::lucy_richardson_gaussian(
            &input_px,
            w,
            h,
            sharpened.pixels_mut::<f32>(),
            settings.lucy_richardson.iterations,
            settings.lucy_richardson.sigma,
            config.convolution_method,
            &mut |_, _| {},
            &mut || cancel.is_cancelled(),
        );
        if status == CompletionStatus::Aborted {
            return Err(Error::Cancelled);
        }
        clamp_mono32f(&mut sharpened);
    } else {
        sharpened
            .pixels_mut::<f32>()
            .copy_from_slice(img.pixels::<f32>());
    }

    // Unsharp masking passes.
    let mut current = sharpened;
    for pass in &settings.unsharp_masking {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !pass.is_effective() {
            continue;
        }
        let mut output = Image::new(current.width(), current.height(), PixelFormat::Mono32F)?;
        unsharp::unsharp_mask(
            current.pixels::<f32>(),
            img.pixels::<f32>(),
            w,
            h,
            output.pixels_mut::<f32>(),
            pass,
        );
        current = output;
    }

    // Tone curve, always precise for file output.
    let mut curve = settings.tone_curve.clone();
    curve.refresh_lut(config.tone_curve_lut_size);
    let mut output = Image::new(current.width(), current.height(), PixelFormat::Mono32F)?;
    for y in 0..current.height() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let in_row = current.row::<f32>(y);
        let out_row = output.row_mut::<f32>(y);
        for (o, &v) in out_row.iter_mut().zip(in_row) {
            *o = curve.precise_value(v);
        }
    }
    Ok(output)
}

fn output_path(params: &BatchParams, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    params
        .output_dir
        .join(format!("{stem}_out.{}", params.output_format.extension()))
}

/// Runs a batch synchronously, reporting per-file status on `sender`.
/// Cancellation is honored between files and at the pipeline's own
/// suspension points.
pub fn run_batch(
    params: &BatchParams,
    config: &CoreConfig,
    sender: &Sender<BatchEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut settings = ProcessingSettings::new();
    load_settings(&params.settings_file, &mut settings)?;

    for (i, input) in params.input_files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let _ = sender.send(BatchEvent::FileStarted { index: i });

        let result = (|| -> Result<PathBuf> {
            let mut img = io::load_image_as_mono32f(input, config.normalize_fits_values)?;
            if settings.normalization.enabled {
                normalize::normalize_fp_image(
                    &mut img,
                    settings.normalization.min,
                    settings.normalization.max,
                );
            }
            let processed = process_image(&img, &settings, config, cancel)?;
            let out = output_path(params, input);
            io::save_image(&out, &processed, params.output_format)?;
            Ok(out)
        })();

        match result {
            Ok(output) => {
                info!("processed {} -> {}", input.display(), output.display());
                let _ = sender.send(BatchEvent::FileDone { index: i, output });
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("failed to process {}: {e}", input.display());
                let _ = sender.send(BatchEvent::FileError {
                    index: i,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// A batch run on its own worker thread.
pub struct BatchJob {
    events: Receiver<BatchEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl BatchJob {
    pub fn start(params: BatchParams, config: CoreConfig) -> BatchJob {
        let (tx, rx) = unbounded();
        let cancel = CancelToken::new();
        let cancel_worker = cancel.clone();

        let join = std::thread::spawn(move || {
            match run_batch(&params, &config, &tx, &cancel_worker) {
                Ok(()) => {
                    let _ = tx.send(BatchEvent::Completed);
                }
                Err(_) => {
                    let _ = tx.send(BatchEvent::Aborted);
                }
            }
        });

        BatchJob {
            events: rx,
            cancel,
            join: Some(join),
        }
    }

    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::proc::unsharp::UnsharpMaskParams;
    use crate::settings::save_settings;

    fn write_input(dir: &Path, name: &str) -> PathBuf {
        let mut img = Image::new(32, 32, PixelFormat::Mono32F).unwrap();
        for y in 0..32 {
            for x in 0..32usize {
                img.row_mut::<f32>(y)[x] = ((x + y as usize) % 16) as f32 / 16.0;
            }
        }
        let path = dir.join(name);
        io::save_image(&path, &img, OutputFormat::Tiff32F).unwrap();
        path
    }

    fn quick_settings() -> ProcessingSettings {
        let mut s = ProcessingSettings::new();
        s.lucy_richardson.iterations = 2;
        s.lucy_richardson.sigma = 1.3;
        s.unsharp_masking = vec![UnsharpMaskParams {
            amount_max: 1.5,
            ..Default::default()
        }];
        s
    }

    #[test]
    fn batch_processes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let in1 = write_input(dir.path(), "a.tif");
        let in2 = write_input(dir.path(), "b.tif");
        let settings_path = dir.path().join("settings.xml");
        save_settings(&settings_path, &quick_settings()).unwrap();

        let params = BatchParams {
            input_files: vec![in1, in2],
            settings_file: settings_path,
            output_dir: dir.path().to_path_buf(),
            output_format: OutputFormat::Tiff16,
        };

        let job = BatchJob::start(params, CoreConfig::default());
        let mut done = 0;
        let mut completed = false;
        while let Ok(ev) = job
            .events()
            .recv_timeout(std::time::Duration::from_secs(60))
        {
            match ev {
                BatchEvent::FileDone { .. } => done += 1,
                BatchEvent::Completed => {
                    completed = true;
                    break;
                }
                BatchEvent::FileError { message, .. } => panic!("file error: {message}"),
                _ => {}
            }
        }
        job.join();
        assert!(completed);
        assert_eq!(done, 2);
        assert!(dir.path().join("a_out.tif").exists());
        assert!(dir.path().join("b_out.tif").exists());
    }

    #[test]
    fn missing_input_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_input(dir.path(), "good.tif");
        let settings_path = dir.path().join("settings.xml");
        save_settings(&settings_path, &quick_settings()).unwrap();

        let params = BatchParams {
            input_files: vec![dir.path().join("missing.tif"), good],
            settings_file: settings_path,
            output_dir: dir.path().to_path_buf(),
            output_format: OutputFormat::Bmp8,
        };

        let (tx, rx) = unbounded();
        run_batch(&params, &CoreConfig::default(), &tx, &CancelToken::new()).unwrap();

        let events: Vec<BatchEvent> = rx.try_iter().collect();
        assert!(matches!(events[1], BatchEvent::FileError { index: 0, .. }));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, BatchEvent::FileDone { index: 1, .. }))
        );
        assert!(dir.path().join("good_out.bmp").exists());
    }
}
