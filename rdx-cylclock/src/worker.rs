//! The off-render-path geometry worker and its message protocol.
//!
//! The worker owns nothing the clock can see except its two channels.
//! Requests go in as [`WorkerRequest`]s; every `Generate` produces exactly one
//! [`WorkerResponse`] carrying the same correlation keys. Vertex buffers move
//! through the channel by value, so nothing is copied on the way back.

use crate::common::{MinuteIndex, RequestId};
use crate::error::{ClockError, GeometryError};
use crate::factory::{GeometryReply, GeometryRequest, LabelGeometry, MeshFactory};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Messages into the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Generate(GeometryRequest),
    Shutdown,
}

/// Messages out of the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerResponse {
    Geometry {
        request_id: RequestId,
        minute_index: MinuteIndex,
        positions: Vec<f32>,
        normals: Vec<f32>,
    },
    Error {
        request_id: RequestId,
        minute_index: MinuteIndex,
        message: String,
    },
}

impl From<GeometryReply> for WorkerResponse {
    fn from(reply: GeometryReply) -> Self {
        match reply.result {
            Ok(geometry) => WorkerResponse::Geometry {
                request_id: reply.request_id,
                minute_index: reply.minute_index,
                positions: geometry.positions,
                normals: geometry.normals,
            },
            Err(err) => WorkerResponse::Error {
                request_id: reply.request_id,
                minute_index: reply.minute_index,
                message: err.message,
            },
        }
    }
}

impl From<WorkerResponse> for GeometryReply {
    fn from(response: WorkerResponse) -> Self {
        match response {
            WorkerResponse::Geometry {
                request_id,
                minute_index,
                positions,
                normals,
            } => GeometryReply {
                request_id,
                minute_index,
                result: Ok(LabelGeometry { positions, normals }),
            },
            WorkerResponse::Error {
                request_id,
                minute_index,
                message,
            } => GeometryReply {
                request_id,
                minute_index,
                result: Err(GeometryError::new(request_id, minute_index, message)),
            },
        }
    }
}

/// Runs one request on the blocking pool. Never fails: errors and panics come
/// back as an error reply with the request's keys.
pub async fn generate(factory: Arc<dyn MeshFactory>, request: GeometryRequest) -> GeometryReply {
    let (request_id, minute_index) = (request.request_id, request.minute_index);
    let result = match tokio::task::spawn_blocking(move || factory.build(&request)).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => Err(GeometryError::new(
            request_id,
            minute_index,
            panic_message(join_error.into_panic()),
        )),
        Err(join_error) => Err(GeometryError::new(
            request_id,
            minute_index,
            format!("geometry generation aborted: {join_error}"),
        )),
    };
    GeometryReply {
        request_id,
        minute_index,
        result,
    }
}

/// Runs one request on the calling thread. A panicking factory comes back as
/// an error reply, as it does on the blocking pool.
pub fn generate_in_place(factory: &dyn MeshFactory, request: &GeometryRequest) -> GeometryReply {
    let result = panic::catch_unwind(AssertUnwindSafe(|| factory.build(request)))
        .unwrap_or_else(|payload| {
            Err(GeometryError::new(
                request.request_id,
                request.minute_index,
                panic_message(payload),
            ))
        });
    GeometryReply {
        request_id: request.request_id,
        minute_index: request.minute_index,
        result,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("geometry generation panicked: {detail}")
}

/// Handle to a running geometry worker.
pub struct GeometryWorker {
    request_tx: mpsc::UnboundedSender<WorkerRequest>,
    task: Option<JoinHandle<()>>,
}

impl GeometryWorker {
    /// Spawns the worker task. Replies arrive on the returned receiver.
    pub fn spawn(
        factory: Arc<dyn MeshFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerResponse>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker_loop(factory, request_rx, response_tx));
        (
            Self {
                request_tx,
                task: Some(task),
            },
            response_rx,
        )
    }

    /// Queues a request without waiting for it.
    pub fn request(&self, request: GeometryRequest) -> Result<(), ClockError> {
        self.request_tx
            .send(WorkerRequest::Generate(request))
            .map_err(|_| ClockError::WorkerGone)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some() && !self.request_tx.is_closed()
    }

    /// Stops accepting requests. Generations already running finish on the
    /// blocking pool; their replies are dropped if nobody listens any more.
    /// Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.task.take().is_some() {
            self.request_tx.send(WorkerRequest::Shutdown).ok();
            debug!("Geometry worker terminated.");
        }
    }
}

impl Drop for GeometryWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn worker_loop(
    factory: Arc<dyn MeshFactory>,
    mut request_rx: mpsc::UnboundedReceiver<WorkerRequest>,
    response_tx: mpsc::UnboundedSender<WorkerResponse>,
) {
    debug!("Geometry worker started.");
    while let Some(message) = request_rx.recv().await {
        match message {
            WorkerRequest::Generate(request) => {
                let factory = factory.clone();
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    let reply = generate(factory, request).await;
                    if let Err(err) = &reply.result {
                        warn!("{}", err);
                    }
                    if response_tx.send(reply.into()).is_err() {
                        debug!("Geometry reply dropped: the clock is gone.");
                    }
                });
            }
            WorkerRequest::Shutdown => break,
        }
    }
    request_rx.close();
    debug!("Geometry worker stopped.");
}
