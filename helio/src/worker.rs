// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Background task execution with progress reporting and cooperative
//! cancellation. At most one pipeline worker runs at a time; the alignment
//! engine keeps its own single worker. A worker may fan out internally over
//! CPU cores, but never outlives its task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::debug;

use crate::error::Error;
use crate::image::Image;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompletionStatus {
    Completed,
    Aborted,
}

/// One of the pipeline's processing steps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessingRequest {
    None,
    Sharpening,
    UnsharpMasking,
    ToneCurve,
}

#[derive(Debug)]
pub enum WorkerEventPayload {
    Progress {
        percentage: u32,
    },
    /// Sent exactly once, as the worker's last message. A completed stage
    /// hands its output image back to the coordinator here.
    Finished {
        status: CompletionStatus,
        output: Option<Image>,
        error: Option<String>,
    },
}

/// Message from a worker to the coordinator. Events whose `thread_id` is
/// older than the coordinator's current id are discarded on receipt.
#[derive(Debug)]
pub struct WorkerEvent {
    pub task_id: u32,
    pub thread_id: u32,
    pub payload: WorkerEventPayload,
}

/// Cooperatively-polled cancellation flag. `cancel()` is non-blocking; the
/// worker notices at its next suspension point.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything a worker body receives: identifiers for event stamping, the
/// event channel and the cancellation flag.
pub struct WorkerContext {
    task_id: u32,
    thread_id: u32,
    sender: Sender<WorkerEvent>,
    cancel: CancelToken,
}

impl WorkerContext {
    pub fn report_progress(&self, percentage: u32) {
        let _ = self.sender.send(WorkerEvent {
            task_id: self.task_id,
            thread_id: self.thread_id,
            payload: WorkerEventPayload::Progress { percentage },
        });
    }

    pub fn is_abort_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }
}

/// Handle to a spawned worker, held by the coordinator in its single worker
/// slot until the worker's `Finished` event arrives.
pub struct WorkerHandle {
    thread_id: u32,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Requests cancellation; returns immediately.
    pub fn abort(&self) {
        debug!("sending abort request to worker {}", self.thread_id);
        self.cancel.cancel();
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Waits for the worker thread to exit. Called by the coordinator after
    /// it has received the worker's `Finished` event, so the wait is brief.
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawns a worker executing `body`. The worker emits progress itself via
/// the context; its return value is converted into the final `Finished`
/// event. Errors never cross the thread boundary as panics.
pub fn spawn_worker<F>(
    task_id: u32,
    thread_id: u32,
    sender: Sender<WorkerEvent>,
    body: F,
) -> WorkerHandle
where
    F: FnOnce(&WorkerContext) -> Result<(CompletionStatus, Option<Image>), Error>
        + Send
        + 'static,
{
    let cancel = CancelToken::new();
    let ctx = WorkerContext {
        task_id,
        thread_id,
        sender: sender.clone(),
        cancel: cancel.clone(),
    };

    let join = std::thread::spawn(move || {
        let payload = match body(&ctx) {
            Ok((status, output)) => WorkerEventPayload::Finished {
                status,
                output,
                error: None,
            },
            Err(e) => WorkerEventPayload::Finished {
                status: CompletionStatus::Aborted,
                output: None,
                error: Some(e.to_string()),
            },
        };
        let _ = sender.send(WorkerEvent {
            task_id,
            thread_id,
            payload,
        });
    });

    WorkerHandle {
        thread_id,
        cancel,
        join: Some(join),
    }
}
