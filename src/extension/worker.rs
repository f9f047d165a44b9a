//! Script worker threads
//!
//! deno_core isolates are single-threaded, so each extension gets a dedicated
//! thread with a current-thread tokio runtime. The handle only holds a channel
//! sender, which makes it `Send + Sync` and cheap to clone. The thread exits
//! once every handle is dropped.

use serde_json::Value;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::context::{ContextKind, ProviderContext};
use super::sandbox::ScriptSandbox;
use super::types::InstanceSurface;
use crate::core::error::{ErrorContext, ReelError, Result};

/// Command sent to a script worker thread
enum WorkerCommand {
    Instantiate {
        resp: oneshot::Sender<Result<InstanceSurface>>,
    },
    Call {
        method: String,
        args: Vec<Value>,
        resp: oneshot::Sender<Result<Value>>,
    },
    GarbageCollect {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Everything a worker needs to bring an extension up
pub(crate) struct WorkerSpec {
    pub extension_id: String,
    pub kind: ContextKind,
    pub context: ProviderContext,
    pub source: String,
    pub factory_name: String,
    pub stack_size: usize,
    pub channel_capacity: usize,
}

/// Handle to an extension running on its own isolate thread
#[derive(Clone)]
pub struct ScriptWorker {
    extension_id: String,
    tx: mpsc::Sender<WorkerCommand>,
}

impl ScriptWorker {
    /// Start the worker thread and evaluate the source
    ///
    /// Resolves once the factory has been found. Evaluation failures are
    /// reported here and the thread is torn down.
    pub(crate) async fn spawn(spec: WorkerSpec) -> Result<Self> {
        let extension_id = spec.extension_id.clone();
        let (tx, mut rx) = mpsc::channel::<WorkerCommand>(spec.channel_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let thread_id = extension_id.clone();
        thread::Builder::new()
            .name(format!("js-ext-{}", extension_id))
            .stack_size(spec.stack_size)
            .spawn(move || {
                debug!(extension = %thread_id, "Starting script worker thread");

                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(extension = %thread_id, error = %e, "Failed to create worker runtime");
                        let _ = ready_tx.send(Err(ReelError::Runtime(format!(
                            "failed to create worker runtime: {}",
                            e
                        ))));
                        return;
                    }
                };

                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, async move {
                    let mut sandbox =
                        match ScriptSandbox::new(&spec.extension_id, spec.kind, spec.context) {
                            Ok(sandbox) => sandbox,
                            Err(e) => {
                                let _ = ready_tx.send(Err(e));
                                return;
                            }
                        };

                    if let Err(e) = sandbox.evaluate(&spec.source, &spec.factory_name) {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                    drop(spec.source);
                    let _ = ready_tx.send(Ok(()));

                    while let Some(cmd) = rx.recv().await {
                        match cmd {
                            WorkerCommand::Instantiate { resp } => {
                                let _ = resp.send(sandbox.instantiate());
                            }
                            WorkerCommand::Call { method, args, resp } => {
                                let result = sandbox.call(&method, &args).await;
                                let _ = resp.send(result);
                            }
                            WorkerCommand::GarbageCollect { resp } => {
                                sandbox.garbage_collect();
                                let _ = resp.send(Ok(()));
                            }
                        }
                    }

                    info!(extension = %thread_id, "Script worker thread exiting");
                });
            })
            .context("failed to spawn worker thread")?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self { extension_id, tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ReelError::Runtime(format!(
                "worker for {} exited during startup",
                extension_id
            ))),
        }
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> WorkerCommand,
    ) -> Result<T> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx.send(make(resp_tx)).await.map_err(|_| {
            ReelError::Runtime(format!("worker for {} is gone", self.extension_id))
        })?;

        match resp_rx.await {
            Ok(result) => result,
            Err(_) => Err(ReelError::Runtime(format!(
                "worker for {} dropped the request",
                self.extension_id
            ))),
        }
    }

    /// Call the factory and report the instance surface
    pub async fn instantiate(&self) -> Result<InstanceSurface> {
        self.request(|resp| WorkerCommand::Instantiate { resp }).await
    }

    /// Invoke a method on the live instance
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let method = method.to_string();
        self.request(|resp| WorkerCommand::Call { method, args, resp }).await
    }

    pub async fn garbage_collect(&self) -> Result<()> {
        self.request(|resp| WorkerCommand::GarbageCollect { resp }).await
    }
}

impl std::fmt::Debug for ScriptWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptWorker")
            .field("extension_id", &self.extension_id)
            .finish()
    }
}
