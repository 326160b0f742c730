//! Command handlers wiring the configuration into the upload stack.

use std::sync::Arc;

use anyhow::Context;
use resup_checkpoint::{CheckpointStore, FileCheckpointStore};
use resup_protocol::{SourceRef, UploadId};
use resup_status::StatusChannel;
use resup_supervisor::{TaskEvent, TaskSupervisor, TokioExecutor, TracingIndicator};
use resup_transfer::{
    DirectoryTransport, FileSourceOpener, SimulatedTransport, TransferEngine, Transport,
};

use crate::Command;
use crate::config::Config;

/// How a command ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Done,
    /// The upload was interrupted; its checkpoint is kept.
    Cancelled,
}

pub async fn run(command: Command, config: Config) -> anyhow::Result<Finish> {
    let store: Arc<dyn CheckpointStore> = Arc::new(
        FileCheckpointStore::open(&config.checkpoint_path).with_context(|| {
            format!(
                "opening checkpoints at {}",
                config.checkpoint_path.display()
            )
        })?,
    );

    match command {
        Command::Upload { path, id } => {
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            let source = SourceRef::from_path(&path);
            let upload_id = id.map(UploadId::new).unwrap_or_else(|| source.upload_id());
            let supervisor = build_supervisor(&config, store);
            upload(&supervisor, upload_id, source).await
        }
        Command::Checkpoints => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("no checkpoints");
            }
            for entry in entries {
                println!("{}\t{}", entry.bytes_confirmed, entry.upload_id);
            }
            Ok(Finish::Done)
        }
        Command::Abandon { id } => {
            let upload_id = UploadId::new(id);
            let supervisor = build_supervisor(&config, store);
            supervisor.abandon(&upload_id)?;
            println!("discarded checkpoint for {upload_id}");
            Ok(Finish::Done)
        }
    }
}

fn build_supervisor(config: &Config, store: Arc<dyn CheckpointStore>) -> TaskSupervisor {
    let transport: Arc<dyn Transport> = match &config.destination {
        Some(root) => {
            tracing::info!(destination = %root.display(), "uploading to directory");
            Arc::new(DirectoryTransport::new(root))
        }
        None => {
            tracing::info!(
                latency_ms = config.simulated_latency_ms,
                "no destination configured, using simulated remote"
            );
            Arc::new(SimulatedTransport::new(config.simulated_latency()))
        }
    };

    let engine = TransferEngine::new(
        store,
        Arc::new(FileSourceOpener),
        transport,
        config.engine_config(),
    );

    TaskSupervisor::new(
        Arc::new(engine),
        StatusChannel::new(),
        Arc::new(TokioExecutor),
        Arc::new(TracingIndicator),
        config.retry_config(),
    )
}

/// Submits the upload and renders its progress until it ends.
async fn upload(
    supervisor: &TaskSupervisor,
    upload_id: UploadId,
    source: SourceRef,
) -> anyhow::Result<Finish> {
    let mut events = supervisor
        .take_events()
        .context("task events already taken")?;
    let mut progress = supervisor.status().subscribe(&upload_id);

    supervisor.submit(upload_id.clone(), source);

    let mut last_shown = None;
    let finished = loop {
        tokio::select! {
            biased;
            Some(event) = progress.recv() => {
                let shown = (event.percent, event.state);
                if last_shown != Some(shown) {
                    println!("{:>3}% {}", event.percent, event.state);
                    last_shown = Some(shown);
                }
            }
            Some(event) = events.recv() => {
                if event.upload_id() == &upload_id {
                    break event;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping after the current chunk");
                supervisor.cancel(&upload_id);
            }
        }
    };

    while let Some(event) = progress.try_recv() {
        if last_shown != Some((event.percent, event.state)) {
            println!("{:>3}% {}", event.percent, event.state);
            last_shown = Some((event.percent, event.state));
        }
    }

    match finished {
        TaskEvent::Succeeded { .. } => {
            println!("{upload_id}: done");
            Ok(Finish::Done)
        }
        TaskEvent::Cancelled { .. } => {
            println!("{upload_id}: stopped, run again to resume");
            Ok(Finish::Cancelled)
        }
        TaskEvent::Failed {
            error, attempts, ..
        } => {
            anyhow::bail!("{upload_id}: failed after {attempts} attempt(s): {error}")
        }
    }
}
