// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Image sequence alignment: translation estimation via phase correlation
//! or by anchoring the solar limb, followed by cropped or padded output.
//! The engine runs on its own single worker thread and is cooperatively
//! cancellable between files.

use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::info;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::worker::CancelToken;

pub mod limb;
pub mod phasecorr;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AlignmentMethod {
    PhaseCorrelation,
    Limb,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CropMode {
    /// Output covers the intersection of all aligned frames.
    CropToIntersection,
    /// Output covers the union of all aligned frames, padded with zeros.
    PadToBoundingBox,
}

/// Frames to align: image files on disk, or an in-memory sequence. With
/// in-memory input the engine emits the translation vectors and writes no
/// output files.
pub enum AlignmentInput {
    Files(Vec<PathBuf>),
    Images(Vec<Image>),
}

impl AlignmentInput {
    pub fn len(&self) -> usize {
        match self {
            AlignmentInput::Files(f) => f.len(),
            AlignmentInput::Images(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded or borrowed frame.
pub enum ImageAccessor<'a> {
    Owned(Image),
    Borrowed(&'a Image),
    Empty,
}

impl ImageAccessor<'_> {
    pub fn get(&self) -> Option<&Image> {
        match self {
            ImageAccessor::Owned(img) => Some(img),
            ImageAccessor::Borrowed(img) => Some(img),
            ImageAccessor::Empty => None,
        }
    }
}

pub struct AlignmentParams {
    pub input: AlignmentInput,
    pub method: AlignmentMethod,
    pub crop_mode: CropMode,
    pub subpixel_alignment: bool,
    pub output_dir: PathBuf,
    /// Appended to each input file's stem when naming outputs.
    pub output_file_suffix: String,
    pub normalize_fits_values: bool,
}

impl AlignmentParams {
    pub fn new(input: AlignmentInput) -> AlignmentParams {
        AlignmentParams {
            input,
            method: AlignmentMethod::PhaseCorrelation,
            crop_mode: CropMode::CropToIntersection,
            subpixel_alignment: true,
            output_dir: PathBuf::new(),
            output_file_suffix: "_aligned".into(),
            normalize_fits_values: true,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AbortReason {
    Requested,
    ProcError,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlignmentEvent {
    /// Cumulative translation of the i-th frame relative to the first.
    PhaseCorrImgTranslation { index: usize, translation: (f32, f32) },
    SavedOutputImage { index: usize },
    LimbFoundDiscRadius { index: usize, radius: f32 },
    LimbUsingRadius { radius: f32 },
    LimbStabilizationProgress { index: usize },
    LimbStabilizationFailure { message: String },
    Completed,
    Aborted { reason: AbortReason, message: String },
}

/// Worker-side handle: event emission plus the cancellation flag.
pub(crate) struct JobContext {
    sender: Sender<AlignmentEvent>,
    cancel: CancelToken,
}

impl JobContext {
    pub(crate) fn send(&self, event: AlignmentEvent) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn check_abort(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A running alignment job.
pub struct AlignmentJob {
    events: Receiver<AlignmentEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl AlignmentJob {
    /// Spawns the alignment worker.
    pub fn start(params: AlignmentParams) -> AlignmentJob {
        let (tx, rx) = unbounded();
        let cancel = CancelToken::new();
        let ctx = JobContext {
            sender: tx,
            cancel: cancel.clone(),
        };

        let join = std::thread::spawn(move || {
            info!("starting image alignment ({:?})", params.method);
            let result = match params.method {
                AlignmentMethod::PhaseCorrelation => phasecorr::align_phase_correlation(&params, &ctx),
                AlignmentMethod::Limb => limb::align_limb(&params, &ctx),
            };
            match result {
                Ok(()) => ctx.send(AlignmentEvent::Completed),
                Err(Error::Cancelled) => ctx.send(AlignmentEvent::Aborted {
                    reason: AbortReason::Requested,
                    message: "Aborted per user request.".into(),
                }),
                Err(e) => ctx.send(AlignmentEvent::Aborted {
                    reason: AbortReason::ProcError,
                    message: e.to_string(),
                }),
            }
        });

        AlignmentJob {
            events: rx,
            cancel,
            join: Some(join),
        }
    }

    pub fn events(&self) -> &Receiver<AlignmentEvent> {
        &self.events
    }

    /// Requests cancellation; returns immediately.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker to exit.
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Destination path for the i-th aligned frame: the input stem plus the
/// configured suffix. FITS stays FITS, everything else is written as TIFF.
pub(crate) fn output_path(params: &AlignmentParams, input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "aligned".into());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let out_ext = if ext == "fit" || ext == "fits" {
        ext.as_str()
    } else {
        "tif"
    };
    params
        .output_dir
        .join(format!("{stem}{}.{out_ext}", params.output_file_suffix))
}
