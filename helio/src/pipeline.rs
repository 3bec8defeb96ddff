// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Staged execution of the processing pipeline over the current selection.
//!
//! The pipeline runs `input selection -> L-R -> unsharp masking -> tone
//! curve`, caching each stage's output. Parameter changes invalidate their
//! stage and everything after it; a request names the latest stale stage and
//! is promoted to the earliest invalid one. At most one worker runs at any
//! time; a request issued while one is active aborts it and restarts once
//! its completion event arrives.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, Rect, clamp_mono32f, copy_rect};
use crate::io::{self, OutputFormat};
use crate::proc::lr::{self, LucyRichardsonSettings};
use crate::proc::normalize::NormalizationSettings;
use crate::proc::tcurve::ToneCurve;
use crate::proc::unsharp::{self, UnsharpMaskParams};
use crate::worker::{
    CompletionStatus, ProcessingRequest, WorkerEvent, WorkerEventPayload, WorkerHandle,
    spawn_worker,
};

/// Complete description of the processing applied to an image.
#[derive(Clone, Debug)]
pub struct ProcessingSettings {
    pub normalization: NormalizationSettings,
    pub lucy_richardson: LucyRichardsonSettings,
    /// At least one pass; later passes consume earlier passes' output.
    pub unsharp_masking: Vec<UnsharpMaskParams>,
    pub tone_curve: ToneCurve,
}

impl Default for ProcessingSettings {
    fn default() -> ProcessingSettings {
        ProcessingSettings::new()
    }
}

impl ProcessingSettings {
    pub fn new() -> ProcessingSettings {
        ProcessingSettings {
            normalization: NormalizationSettings::default(),
            lucy_richardson: LucyRichardsonSettings::default(),
            unsharp_masking: vec![UnsharpMaskParams::default()],
            tone_curve: ToneCurve::default(),
        }
    }

    fn unsharp_effective(&self) -> bool {
        self.unsharp_masking.iter().any(|p| p.is_effective())
    }

    fn tone_curve_effective(&self) -> bool {
        let tc = &self.tone_curve;
        if tc.is_gamma_mode() {
            return tc.gamma() != 1.0;
        }
        tc.num_points() != 2 || tc.point(0) != (0.0, 0.0) || tc.point(1) != (1.0, 1.0)
    }
}

/// One stage's cached output.
#[derive(Default)]
struct StageOutput {
    img: Option<Image>,
    valid: bool,
}

/// Per-selection cache of the three stage outputs.
#[derive(Default)]
struct StageCache {
    sharpening: StageOutput,
    unsharp_masking: StageOutput,
    tone_curve: StageOutput,
    /// Whether `tone_curve.img` was produced with precise curve values.
    precise_values_applied: bool,
}

impl StageCache {
    fn invalidate_from(&mut self, request: ProcessingRequest) {
        match request {
            ProcessingRequest::Sharpening => {
                self.sharpening.valid = false;
                self.unsharp_masking.valid = false;
                self.tone_curve.valid = false;
            }
            ProcessingRequest::UnsharpMasking => {
                self.unsharp_masking.valid = false;
                self.tone_curve.valid = false;
            }
            ProcessingRequest::ToneCurve => {
                self.tone_curve.valid = false;
            }
            ProcessingRequest::None => {}
        }
    }
}

/// Externally visible outcome of event processing.
#[derive(Debug, PartialEq)]
pub enum Notice {
    Progress {
        request: ProcessingRequest,
        percentage: u32,
    },
    StageCompleted(ProcessingRequest),
    /// All requested stages finished; the selection's processed output is
    /// available via [`Scheduler::tone_curve_output`].
    ProcessingCompleted,
    Aborted {
        error: Option<String>,
    },
    Saved(PathBuf),
    SaveFailed(String),
}

pub struct Scheduler {
    config: CoreConfig,
    img: Option<Image>,
    selection: Rect,
    settings: ProcessingSettings,
    cache: StageCache,

    worker: Option<WorkerHandle>,
    current_thread_id: u32,
    request: ProcessingRequest,
    /// Set when a new request arrived while a worker was running; the
    /// restart fires on that worker's completion event.
    processing_scheduled: bool,
    use_precise_tcurve: bool,
    pending_save: Option<(PathBuf, OutputFormat)>,

    /// Outcomes accumulated since the last poll. Synchronously skipped
    /// stages complete without any worker event, so notices cannot be
    /// derived from the channel alone.
    pending_notices: Vec<Notice>,

    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
}

impl Scheduler {
    pub fn new(config: CoreConfig) -> Scheduler {
        let (events_tx, events_rx) = unbounded();
        Scheduler {
            config,
            img: None,
            selection: Rect::default(),
            settings: ProcessingSettings::new(),
            cache: StageCache::default(),
            worker: None,
            current_thread_id: 0,
            request: ProcessingRequest::None,
            processing_scheduled: false,
            use_precise_tcurve: false,
            pending_save: None,
            pending_notices: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn image(&self) -> Option<&Image> {
        self.img.as_ref()
    }

    pub fn selection(&self) -> Rect {
        self.selection
    }

    pub fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    /// Output of the last completed tone curve stage, if valid.
    pub fn tone_curve_output(&self) -> Option<&Image> {
        if self.cache.tone_curve.valid {
            self.cache.tone_curve.img.as_ref()
        } else {
            None
        }
    }

    /// Output of the last completed unsharp masking stage (input of the tone
    /// curve; this is what histograms are computed from).
    pub fn unsharp_masking_output(&self) -> Option<&Image> {
        if self.cache.unsharp_masking.valid {
            self.cache.unsharp_masking.img.as_ref()
        } else {
            None
        }
    }

    pub fn is_processing(&self) -> bool {
        self.worker.is_some()
    }

    /// Installs a new image; the previous image and all cached stage
    /// outputs are released. Without an explicit selection the middle fifth
    /// of the image is selected.
    pub fn set_image(&mut self, img: Image, selection: Option<Rect>) -> Result<()> {
        if img.format() != PixelFormat::Mono32F {
            return Err(Error::UnsupportedConversion(
                img.format(),
                PixelFormat::Mono32F,
            ));
        }
        let selection = selection.unwrap_or(Rect::new(
            (4 * img.width() / 10) as i32,
            (4 * img.height() / 10) as i32,
            (img.width() / 5).max(1),
            (img.height() / 5).max(1),
        ));
        if !selection.fits_in(img.width(), img.height()) || selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        let mut img = img;
        if self.settings.normalization.enabled {
            crate::proc::normalize::normalize_fp_image(
                &mut img,
                self.settings.normalization.min,
                self.settings.normalization.max,
            );
        }
        self.img = Some(img);
        self.selection = selection;
        self.cache = StageCache::default();
        self.pending_save = None;
        self.schedule_processing(ProcessingRequest::Sharpening);
        Ok(())
    }

    /// Changes the selection; all stage outputs become stale.
    pub fn set_selection(&mut self, selection: Rect) -> Result<()> {
        let img = self.img.as_ref().ok_or(Error::EmptySelection)?;
        if !selection.fits_in(img.width(), img.height()) || selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        self.selection = selection;
        self.cache = StageCache::default();
        self.schedule_processing(ProcessingRequest::Sharpening);
        Ok(())
    }

    pub fn set_lr_params(&mut self, params: LucyRichardsonSettings) {
        self.settings.lucy_richardson = params;
        if self.img.is_some() {
            self.schedule_processing(ProcessingRequest::Sharpening);
        }
    }

    pub fn set_unsharp_params(&mut self, pass: usize, params: UnsharpMaskParams) {
        if pass < self.settings.unsharp_masking.len() {
            self.settings.unsharp_masking[pass] = params;
        }
        if self.img.is_some() {
            self.schedule_processing(ProcessingRequest::UnsharpMasking);
        }
    }

    pub fn set_unsharp_passes(&mut self, passes: Vec<UnsharpMaskParams>) {
        debug_assert!(!passes.is_empty());
        self.settings.unsharp_masking = passes;
        if self.img.is_some() {
            self.schedule_processing(ProcessingRequest::UnsharpMasking);
        }
    }

    pub fn set_tone_curve(&mut self, curve: ToneCurve) {
        self.settings.tone_curve = curve;
        if self.img.is_some() {
            self.schedule_processing(ProcessingRequest::ToneCurve);
        }
    }

    /// Replaces the whole settings tuple (e.g. after loading a file).
    pub fn set_settings(&mut self, settings: ProcessingSettings) {
        self.settings = settings;
        if self.img.is_some() {
            self.schedule_processing(ProcessingRequest::Sharpening);
        }
    }

    /// Explicit (re-)processing request for the given stage.
    pub fn request(&mut self, request: ProcessingRequest) {
        if self.img.is_some() {
            self.schedule_processing(request);
        }
    }

    /// Requests a save of the fully processed image. If the selection does
    /// not cover the whole image, it is enlarged and the pipeline re-runs
    /// with precise tone curve values; the file is written once processing
    /// completes. Returns `true` when the file was written synchronously.
    pub fn request_save(&mut self, path: &Path, format: OutputFormat) -> Result<bool> {
        let img = self.img.as_ref().ok_or(Error::EmptySelection)?;
        let full = img.full_rect();

        if self.selection != full {
            self.selection = full;
            self.cache = StageCache::default();
            self.pending_save = Some((path.to_path_buf(), format));
            self.use_precise_tcurve = true;
            self.schedule_processing(ProcessingRequest::Sharpening);
            return Ok(false);
        }

        if self.is_processing() || !self.cache.tone_curve.valid {
            self.pending_save = Some((path.to_path_buf(), format));
            self.use_precise_tcurve = true;
            self.schedule_processing(ProcessingRequest::ToneCurve);
            return Ok(false);
        }

        if !self.cache.precise_values_applied {
            self.apply_precise_tone_curve();
        }
        self.save_output(path, format)?;
        Ok(true)
    }

    /// Aborts the running worker, if any; non-blocking.
    pub fn abort(&mut self) {
        if let Some(worker) = &self.worker {
            worker.abort();
        }
        self.processing_scheduled = false;
        self.pending_save = None;
    }

    /// Drains and handles pending worker events. Call from the coordinator
    /// thread; returns the user-visible outcomes in order.
    pub fn process_events(&mut self) -> Vec<Notice> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        std::mem::take(&mut self.pending_notices)
    }

    /// Like [`Scheduler::process_events`], but blocks for one event first
    /// when nothing has happened yet (used by headless front ends).
    pub fn wait_and_process_events(&mut self) -> Vec<Notice> {
        if self.pending_notices.is_empty()
            && self.is_processing()
            && let Ok(event) = self.events_rx.recv()
        {
            self.handle_event(event);
        }
        self.process_events()
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let is_current = event.thread_id == self.current_thread_id;

        match event.payload {
            WorkerEventPayload::Progress { percentage } => {
                // Progress from a previously launched, already-superseded
                // worker is dropped.
                if is_current {
                    self.pending_notices.push(Notice::Progress {
                        request: self.request,
                        percentage,
                    });
                } else {
                    debug!(
                        "dropping outdated progress event from thread {}",
                        event.thread_id
                    );
                }
            }
            WorkerEventPayload::Finished {
                status,
                output,
                error,
            } => {
                // The emitting worker is about to exit; reap it.
                if self
                    .worker
                    .as_ref()
                    .is_some_and(|w| w.thread_id() == event.thread_id)
                {
                    if let Some(worker) = self.worker.take() {
                        worker.join();
                    }
                }

                if is_current {
                    self.on_step_completed(status, output, error);
                } else {
                    debug!(
                        "dropping outdated completion event from thread {}",
                        event.thread_id
                    );
                }

                if self.processing_scheduled {
                    self.start_processing();
                }
            }
        }
    }

    fn on_step_completed(
        &mut self,
        status: CompletionStatus,
        output: Option<Image>,
        error: Option<String>,
    ) {
        if self.request == ProcessingRequest::ToneCurve || status == CompletionStatus::Aborted {
            if self.request == ProcessingRequest::ToneCurve && status == CompletionStatus::Completed
            {
                self.cache.precise_values_applied = self.use_precise_tcurve;
            }
            self.use_precise_tcurve = false;
        }

        match status {
            CompletionStatus::Completed => {
                match self.request {
                    ProcessingRequest::Sharpening => {
                        if let Some(img) = output {
                            self.cache.sharpening.img = Some(img);
                        }
                        self.cache.sharpening.valid = true;
                        self.pending_notices.push(Notice::StageCompleted(ProcessingRequest::Sharpening));
                        self.schedule_processing(ProcessingRequest::UnsharpMasking);
                    }
                    ProcessingRequest::UnsharpMasking => {
                        if let Some(img) = output {
                            self.cache.unsharp_masking.img = Some(img);
                        }
                        self.cache.unsharp_masking.valid = true;
                        self.pending_notices.push(Notice::StageCompleted(ProcessingRequest::UnsharpMasking));
                        self.schedule_processing(ProcessingRequest::ToneCurve);
                    }
                    ProcessingRequest::ToneCurve => {
                        if let Some(img) = output {
                            self.cache.tone_curve.img = Some(img);
                        }
                        self.cache.tone_curve.valid = true;
                        self.pending_notices.push(Notice::StageCompleted(ProcessingRequest::ToneCurve));
                        self.pending_notices.push(Notice::ProcessingCompleted);

                        if let Some((path, format)) = self.pending_save.take() {
                            match self.save_output(&path, format) {
                                Ok(()) => self.pending_notices.push(Notice::Saved(path)),
                                Err(e) => {
                                    self.pending_notices.push(Notice::SaveFailed(e.to_string()))
                                }
                            }
                        }
                    }
                    ProcessingRequest::None => {}
                }
            }
            CompletionStatus::Aborted => {
                self.pending_save = None;
                self.pending_notices.push(Notice::Aborted { error });
            }
        }
    }

    /// Aborts any running worker and schedules `request` to start as soon
    /// as the worker slot is free. Earlier stages whose outputs are stale
    /// take precedence over the named stage.
    fn schedule_processing(&mut self, request: ProcessingRequest) {
        let mut request = request;
        if request == ProcessingRequest::ToneCurve && !self.cache.unsharp_masking.valid {
            request = ProcessingRequest::UnsharpMasking;
        }
        if request == ProcessingRequest::UnsharpMasking && !self.cache.sharpening.valid {
            request = ProcessingRequest::Sharpening;
        }

        self.cache.invalidate_from(request);
        self.request = request;

        if !self.is_processing() {
            self.start_processing();
        } else {
            if let Some(worker) = &self.worker {
                worker.abort();
            }
            // The new request supersedes the in-flight task entirely: even
            // if the worker slips a completed result past the abort flag,
            // it may belong to a stale image or selection. Advancing the
            // expected id makes its events droppable.
            self.current_thread_id += 1;
            self.processing_scheduled = true;
        }
    }

    fn start_processing(&mut self) {
        if self.is_processing() {
            warn!("worker still running at start of processing");
            return;
        }
        self.processing_scheduled = false;
        if self.img.is_none() {
            return;
        }

        // Outdated events from superseded workers are recognized by their
        // lower thread id and discarded.
        self.current_thread_id += 1;

        match self.request {
            ProcessingRequest::Sharpening => self.start_sharpening(),
            ProcessingRequest::UnsharpMasking => self.start_unsharp_masking(),
            ProcessingRequest::ToneCurve => self.start_tone_curve(),
            ProcessingRequest::None => {}
        }
    }

    fn selection_copy(&self) -> Image {
        let img = self.img.as_ref().unwrap();
        let mut out = Image::new(
            self.selection.width,
            self.selection.height,
            PixelFormat::Mono32F,
        )
        .expect("selection is non-empty");
        copy_rect(img, &mut out, self.selection, 0, 0);
        out
    }

    fn start_sharpening(&mut self) {
        self.cache.invalidate_from(ProcessingRequest::Sharpening);

        if !self.settings.lucy_richardson.is_effective() {
            debug!("sharpening disabled, no work needed");
            self.cache.sharpening.img = Some(self.selection_copy());
            self.on_step_completed(CompletionStatus::Completed, None, None);
            return;
        }

        debug!(
            "launching L-R deconvolution worker (thread id {})",
            self.current_thread_id
        );
        let input = self.selection_copy();
        let lr_settings = self.settings.lucy_richardson;
        let conv_method = self.config.convolution_method;

        self.worker = Some(spawn_worker(
            0,
            self.current_thread_id,
            self.events_tx.clone(),
            move |ctx| {
                let (w, h) = (input.width() as usize, input.height() as usize);
                let mut output = Image::new(input.width(), input.height(), PixelFormat::Mono32F)?;

                let mut preprocessed = None;
                if lr_settings.deringing.enabled {
                    let mut tmp = vec![0.0f32; w * h];
                    lr::blur_threshold_vicinity(
                        input.pixels::<f32>(),
                        w,
                        h,
                        &mut tmp,
                        lr_settings.deringing.threshold,
                        lr_settings.deringing.greater_than,
                        lr_settings.deringing.sigma,
                    );
                    preprocessed = Some(tmp);
                }
                let input_px: &[f32] = preprocessed
                    .as_deref()
                    .unwrap_or_else(|| input.pixels::<f32>());

                let status = lr::lucy_richardson_gaussian(
                    input_px,
                    w,
                    h,
                    output.pixels_mut::<f32>(),
                    lr_settings.iterations,
                    lr_settings.sigma,
                    conv_method,
                    &mut |iter, total| ctx.report_progress(100 * iter / total),
                    &mut || ctx.is_abort_requested(),
                );
                clamp_mono32f(&mut output);
                Ok((status, Some(output)))
            },
        ));
    }

    fn start_unsharp_masking(&mut self) {
        self.cache.invalidate_from(ProcessingRequest::UnsharpMasking);

        let sharpened = self
            .cache
            .sharpening
            .img
            .as_ref()
            .expect("sharpening output exists when its stage is valid");

        if !self.settings.unsharp_effective() {
            debug!("unsharp masking disabled, no work needed");
            self.cache.unsharp_masking.img = Some(sharpened.clone());
            self.on_step_completed(CompletionStatus::Completed, None, None);
            return;
        }

        debug!(
            "launching unsharp masking worker (thread id {})",
            self.current_thread_id
        );
        let input = sharpened.clone();
        let raw = self.selection_copy();
        let passes = self.settings.unsharp_masking.clone();

        self.worker = Some(spawn_worker(
            0,
            self.current_thread_id,
            self.events_tx.clone(),
            move |ctx| {
                let (w, h) = (input.width() as usize, input.height() as usize);
                let total = passes.len() as u32;
                let mut current = input;
                for (i, pass) in passes.iter().enumerate() {
                    if ctx.is_abort_requested() {
                        return Ok((CompletionStatus::Aborted, None));
                    }
                    let mut output =
                        Image::new(current.width(), current.height(), PixelFormat::Mono32F)?;
                    if pass.is_effective() {
                        unsharp::unsharp_mask(
                            current.pixels::<f32>(),
                            raw.pixels::<f32>(),
                            w,
                            h,
                            output.pixels_mut::<f32>(),
                            pass,
                        );
                    } else {
                        output
                            .pixels_mut::<f32>()
                            .copy_from_slice(current.pixels::<f32>());
                    }
                    current = output;
                    ctx.report_progress(100 * (i as u32 + 1) / total);
                }
                Ok((CompletionStatus::Completed, Some(current)))
            },
        ));
    }

    fn start_tone_curve(&mut self) {
        self.cache.invalidate_from(ProcessingRequest::ToneCurve);

        let unsharped = self
            .cache
            .unsharp_masking
            .img
            .as_ref()
            .expect("unsharp masking output exists when its stage is valid");

        if !self.settings.tone_curve_effective() && !self.use_precise_tcurve {
            debug!("tone curve is an identity map, no work needed");
            self.cache.tone_curve.img = Some(unsharped.clone());
            self.on_step_completed(CompletionStatus::Completed, None, None);
            return;
        }

        debug!(
            "launching tone curve worker (thread id {})",
            self.current_thread_id
        );
        let input = unsharped.clone();
        let mut curve = self.settings.tone_curve.clone();
        let use_precise = self.use_precise_tcurve;
        let lut_size = self.config.tone_curve_lut_size;

        self.worker = Some(spawn_worker(
            0,
            self.current_thread_id,
            self.events_tx.clone(),
            move |ctx| {
                curve.refresh_lut(lut_size);
                let mut output = Image::new(input.width(), input.height(), PixelFormat::Mono32F)?;
                let height = input.height();
                let mut last_reported = 0;
                for y in 0..height {
                    if ctx.is_abort_requested() {
                        return Ok((CompletionStatus::Aborted, None));
                    }
                    let in_row = input.row::<f32>(y);
                    let out_row = output.row_mut::<f32>(y);
                    if use_precise {
                        for (o, &v) in out_row.iter_mut().zip(in_row) {
                            *o = curve.precise_value(v);
                        }
                    } else {
                        for (o, &v) in out_row.iter_mut().zip(in_row) {
                            *o = curve.approximated_value(v);
                        }
                    }
                    let percentage = 100 * y / height;
                    if percentage > last_reported + 5 {
                        ctx.report_progress(percentage);
                        last_reported = percentage;
                    }
                }
                Ok((CompletionStatus::Completed, Some(output)))
            },
        ));
    }

    /// Applies the precise tone curve to the cached unsharp masking output,
    /// in the coordinator thread. Used just before a synchronous save.
    fn apply_precise_tone_curve(&mut self) {
        let Some(unsharped) = self.cache.unsharp_masking.img.as_ref() else {
            return;
        };
        let mut curve = self.settings.tone_curve.clone();
        curve.refresh_lut(self.config.tone_curve_lut_size);
        let mut output = self
            .cache
            .tone_curve
            .img
            .take()
            .filter(|img| (img.width(), img.height()) == (unsharped.width(), unsharped.height()))
            .unwrap_or_else(|| {
                Image::new(unsharped.width(), unsharped.height(), PixelFormat::Mono32F)
                    .expect("cached stage size is valid")
            });
        for y in 0..unsharped.height() {
            let in_row = unsharped.row::<f32>(y);
            let out_row = output.row_mut::<f32>(y);
            for (o, &v) in out_row.iter_mut().zip(in_row) {
                *o = curve.precise_value(v);
            }
        }
        self.cache.tone_curve.img = Some(output);
        self.cache.tone_curve.valid = true;
        self.cache.precise_values_applied = true;
    }

    fn save_output(&self, path: &Path, format: OutputFormat) -> Result<()> {
        let img = self
            .cache
            .tone_curve
            .img
            .as_ref()
            .ok_or(Error::EmptySelection)?;
        io::save_image(path, img, format)
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn uniform_image(w: u32, h: u32, value: f32) -> Image {
        let mut img = Image::new(w, h, PixelFormat::Mono32F).unwrap();
        img.pixels_mut::<f32>().fill(value);
        img
    }

    /// Polls until processing settles; returns everything observed.
    fn run_to_idle(s: &mut Scheduler) -> Vec<Notice> {
        let mut all = Vec::new();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(120);
        loop {
            let notices = s.wait_and_process_events();
            let done = notices.iter().any(|n| {
                matches!(n, Notice::ProcessingCompleted | Notice::Aborted { .. })
            });
            all.extend(notices);
            if done && !s.is_processing() {
                return all;
            }
            assert!(std::time::Instant::now() < deadline, "scheduler did not settle");
            std::thread::yield_now();
        }
    }

    fn quick_settings() -> ProcessingSettings {
        let mut s = ProcessingSettings::new();
        s.lucy_richardson.iterations = 3;
        s.unsharp_masking[0].amount_max = 1.5;
        s
    }

    #[test]
    fn all_stages_run_and_chain() {
        let mut s = Scheduler::new(CoreConfig::default());
        s.set_settings(quick_settings());
        s.set_image(uniform_image(64, 64, 0.5), Some(Rect::new(8, 8, 32, 32)))
            .unwrap();

        let notices = run_to_idle(&mut s);
        let completed: Vec<_> = notices
            .iter()
            .filter_map(|n| match n {
                Notice::StageCompleted(r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(
            completed,
            vec![
                ProcessingRequest::Sharpening,
                ProcessingRequest::UnsharpMasking,
                ProcessingRequest::ToneCurve
            ]
        );
        let out = s.tone_curve_output().unwrap();
        assert_eq!((out.width(), out.height()), (32, 32));
    }

    #[test]
    fn disabled_pipeline_completes_synchronously() {
        let mut s = Scheduler::new(CoreConfig::default());
        let mut settings = ProcessingSettings::new();
        settings.lucy_richardson.iterations = 0;
        s.set_settings(settings);
        s.set_image(uniform_image(32, 32, 0.25), None).unwrap();

        // Every stage is a no-op copy; completion needs no worker events.
        let notices = s.process_events();
        assert!(notices.contains(&Notice::ProcessingCompleted));
        assert!(!s.is_processing());
        let out = s.tone_curve_output().unwrap();
        assert!(out.pixels::<f32>().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn selection_change_invalidates_and_reruns() {
        let mut s = Scheduler::new(CoreConfig::default());
        s.set_settings(quick_settings());
        s.set_image(uniform_image(64, 64, 0.5), Some(Rect::new(0, 0, 16, 16)))
            .unwrap();
        run_to_idle(&mut s);

        s.set_selection(Rect::new(4, 4, 24, 24)).unwrap();
        assert!(s.tone_curve_output().is_none());
        run_to_idle(&mut s);
        let out = s.tone_curve_output().unwrap();
        assert_eq!((out.width(), out.height()), (24, 24));
    }

    #[test]
    fn request_while_busy_aborts_and_restarts() {
        let mut s = Scheduler::new(CoreConfig::default());
        let mut settings = quick_settings();
        settings.lucy_richardson.iterations = 300;
        s.set_settings(settings);
        s.set_image(uniform_image(256, 256, 0.5), Some(Rect::new(0, 0, 256, 256)))
            .unwrap();
        assert!(s.is_processing());

        // New parameters while the L-R worker is running: the current task
        // aborts and the pipeline restarts from sharpening.
        let mut settings = quick_settings();
        settings.lucy_richardson.iterations = 2;
        s.set_lr_params(settings.lucy_richardson);

        let notices = run_to_idle(&mut s);
        assert!(notices.contains(&Notice::ProcessingCompleted));
        assert!(s.tone_curve_output().is_some());
    }

    #[test]
    fn abort_produces_no_progress_afterwards() {
        let mut s = Scheduler::new(CoreConfig::default());
        let mut settings = quick_settings();
        settings.lucy_richardson.iterations = 500;
        s.set_settings(settings);
        s.set_image(uniform_image(256, 256, 0.5), Some(Rect::new(0, 0, 256, 256)))
            .unwrap();
        s.abort();

        let mut aborted_seen = false;
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(60);
        while std::time::Instant::now() < deadline {
            let notices = s.wait_and_process_events();
            for n in &notices {
                match n {
                    Notice::Aborted { .. } => aborted_seen = true,
                    Notice::Progress { .. } => {
                        assert!(!aborted_seen, "progress after abort");
                    }
                    _ => {}
                }
            }
            if aborted_seen && !s.is_processing() {
                break;
            }
            std::thread::yield_now();
        }
        assert!(aborted_seen);
    }

    #[test]
    fn save_with_partial_selection_enlarges_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");

        let mut s = Scheduler::new(CoreConfig::default());
        s.set_settings(quick_settings());
        let mut img = uniform_image(100, 100, 0.5);
        img.row_mut::<f32>(0)[0] = 1.0;
        s.set_image(img, Some(Rect::new(10, 10, 20, 20))).unwrap();
        run_to_idle(&mut s);

        let saved_now = s
            .request_save(&path, crate::io::OutputFormat::Tiff32F)
            .unwrap();
        assert!(!saved_now);
        assert_eq!(s.selection(), Rect::new(0, 0, 100, 100));

        let notices = run_to_idle(&mut s);
        assert!(notices.iter().any(|n| matches!(n, Notice::Saved(_))));

        let saved = crate::io::load_image_as_mono32f(&path, false).unwrap();
        assert_eq!((saved.width(), saved.height()), (100, 100));
    }
}
