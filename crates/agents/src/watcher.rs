//! Background hot-reload for agent definition files.
//!
//! Watches the agent directories with `notify`, and on a file change
//! re-reads the document and asks the registry to reload it. The registry
//! compares content hashes, so editor noise (touch, re-save with identical
//! content) never bumps a generation.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::registry::AgentRegistry;

pub struct AgentWatcher {
    _watcher: RecommendedWatcher,
    shutdown_tx: Option<mpsc::Sender<()>>,
    consumer: Option<std::thread::JoinHandle<()>>,
}

impl AgentWatcher {
    /// Watch `dirs` for changes to loaded agent documents. Reloads happen
    /// on the consumer thread; readers only ever see the atomic
    /// Active-pointer swap the registry performs.
    pub fn start(registry: Arc<AgentRegistry>, dirs: &[PathBuf]) -> Result<Self, AgentError> {
        let (event_tx, event_rx) = mpsc::channel::<notify::Event>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = event_tx.send(event);
                }
            },
        )
        .map_err(|e| AgentError::Watch(format!("failed to create watcher: {}", e)))?;

        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| AgentError::Watch(format!("failed to watch {}: {}", dir.display(), e)))?;
        }
        info!("Agent watcher started over {} directories", dirs.len());

        let consumer = std::thread::spawn(move || {
            consume_events(&registry, event_rx, shutdown_rx);
        });

        Ok(Self {
            _watcher: watcher,
            shutdown_tx: Some(shutdown_tx),
            consumer: Some(consumer),
        })
    }

    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        info!("Agent watcher stopped");
    }
}

fn consume_events(
    registry: &AgentRegistry,
    event_rx: mpsc::Receiver<notify::Event>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => process_event(registry, &event),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn process_event(registry: &AgentRegistry, event: &notify::Event) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if path.extension().map_or(true, |ext| ext != "md") {
            continue;
        }
        match registry.reload_path(path) {
            Ok(Some(instance)) => debug!(
                "Hot-reloaded agent {} to generation {}",
                instance.definition.id, instance.generation
            ),
            Ok(None) => {}
            Err(e) => warn!(
                "Hot reload failed for {}, keeping active generation: {}",
                path.display(),
                e
            ),
        }
    }
}
