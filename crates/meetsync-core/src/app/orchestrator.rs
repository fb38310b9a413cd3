//! PipelineHandle - owns the running stage consumers and the status
//! listener.
//!
//! - A fault in any loop stops them all; `wait()` returns that fault.
//! - `shutdown_and_join()` stops taking new deliveries and waits; work
//!   already in flight finishes first.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::listener::ListeningStatus;
use super::processor::StageProcessor;
use crate::domain::SyncError;

type LoopResult = (String, Result<(), SyncError>);

/// Signals shutdown to a running pipeline without owning it.
#[derive(Debug, Clone)]
pub struct PipelineStopper {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl PipelineStopper {
    pub fn stop(&self) {
        // ignore send error: every loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct PipelineHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    joins: JoinSet<LoopResult>,
}

impl PipelineHandle {
    pub(crate) fn spawn(processors: Vec<StageProcessor>, listener: ListeningStatus) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = JoinSet::new();

        for processor in processors {
            let name = processor.name();
            let rx = shutdown_rx.clone();
            joins.spawn(async move { (name, processor.run(rx).await) });
        }
        joins.spawn(async move { ("status-listener".to_string(), listener.run(shutdown_rx).await) });

        info!(loops = joins.len(), "pipeline started");
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            joins,
        }
    }

    pub fn stopper(&self) -> PipelineStopper {
        PipelineStopper {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn stopping(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Wait until every loop has exited.
    ///
    /// The first loop to fail (or to exit without being asked) brings the
    /// others down; its error is returned.
    pub async fn wait(mut self) -> Result<(), SyncError> {
        let mut first_failure = None;

        while let Some(joined) = self.joins.join_next().await {
            let failure = match joined {
                Ok((_, Ok(()))) if self.stopping() => None,
                Ok((name, Ok(()))) => Some(SyncError::LoopStopped {
                    name,
                    reason: "exited without a shutdown request".into(),
                }),
                Ok((name, Err(err))) => {
                    error!(loop_name = %name, error = %err, "pipeline loop failed");
                    Some(err)
                }
                Err(join_err) => Some(SyncError::LoopStopped {
                    name: "unknown".into(),
                    reason: join_err.to_string(),
                }),
            };

            if let Some(err) = failure
                && first_failure.is_none()
            {
                self.request_shutdown();
                first_failure = Some(err);
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => {
                info!("pipeline stopped");
                Ok(())
            }
        }
    }

    /// Request shutdown and wait for every loop.
    pub async fn shutdown_and_join(self) -> Result<(), SyncError> {
        self.request_shutdown();
        self.wait().await
    }
}
