//! File watcher for hot reload of the service config and the site manifest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;

/// Something on disk changed.
#[derive(Debug)]
pub enum ReloadEvent {
    /// The config file changed and the new version is valid.
    Config(Box<ServiceConfig>),
    /// The site manifest changed.
    Manifest,
}

/// Monitors the configuration file and, optionally, the site manifest.
pub struct ConfigWatcher {
    config_path: PathBuf,
    manifest_path: Option<PathBuf>,
    update_tx: mpsc::UnboundedSender<ReloadEvent>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for reload events.
    pub fn new(
        config_path: &Path,
        manifest_path: Option<&Path>,
    ) -> (Self, mpsc::UnboundedReceiver<ReloadEvent>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                config_path: config_path.to_path_buf(),
                manifest_path: manifest_path.map(Path::to_path_buf),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let config_path = self.config_path.clone();
        let manifest_path = self.manifest_path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if touches(&event.paths, manifest_path.as_deref()) {
                        tracing::info!("Site manifest change detected");
                        let _ = tx.send(ReloadEvent::Manifest);
                    }
                    if touches(&event.paths, Some(&config_path)) {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&config_path) {
                            Ok(new_config) => {
                                let _ = tx.send(ReloadEvent::Config(Box::new(new_config)));
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.config_path, RecursiveMode::NonRecursive)?;
        if let Some(manifest) = &self.manifest_path {
            if let Err(e) = watcher.watch(manifest, RecursiveMode::NonRecursive) {
                tracing::warn!(path = ?manifest, error = %e, "Not watching site manifest");
            }
        }

        tracing::info!(path = ?self.config_path, manifest = ?self.manifest_path, "Config watcher started");
        Ok(watcher)
    }
}

/// Whether any event path refers to `target`. Event paths may be absolute
/// while configured paths are relative, so fall back to the file name.
fn touches(paths: &[PathBuf], target: Option<&Path>) -> bool {
    let Some(target) = target else {
        return false;
    };
    paths
        .iter()
        .any(|p| p == target || (p.file_name().is_some() && p.file_name() == target.file_name()))
}
