/// 'Upstreams' are the named backends the relay forwards registration requests to. They're read
/// from a JSON file and, when watching is enabled, reloaded whenever that file changes.
///
/// Every [`Endpoint`] is bound to an upstream name, so the file must define all of them.
use crate::endpoint::Endpoint;
use anyhow::anyhow;
use async_trait::async_trait;
use bon::Builder;
use dashmap::DashMap;
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use url::Url;

/// An upstream is a backend base URL plus the details needed to call it.
///
/// `backend_key` is sent as `Authorization: Bearer {}` on every forwarded request.
/// `timeout_ms` bounds how long a forwarded request may take to receive the backend's response
/// head. The response body is streamed back afterwards and is not covered by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Upstream {
    pub url: Url,
    pub backend_key: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl Upstream {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Appends `path` to the base URL, keeping every segment of the base path.
    pub fn join_path(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path.trim_start_matches('/'))
    }
}

/// The upstreams file contains a map of upstream names to upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub upstreams: HashMap<String, Upstream>,
}

/// The live-updating collection of upstreams.
#[derive(Debug, Clone, Default)]
pub struct Upstreams {
    pub upstreams: Arc<DashMap<String, Upstream>>,
}

#[async_trait]
pub trait UpstreamsStream {
    async fn receive(
        &self,
    ) -> Result<mpsc::Receiver<Result<Upstreams, anyhow::Error>>, anyhow::Error>;
}

pub struct WatchedFile(pub PathBuf);

#[async_trait]
impl UpstreamsStream for WatchedFile {
    /// Watches a file for changes and returns a stream of Upstreams updates.
    async fn receive(
        &self,
    ) -> Result<mpsc::Receiver<Result<Upstreams, anyhow::Error>>, anyhow::Error> {
        let (upstreams_tx, upstreams_rx) = mpsc::channel(100);
        let (file_tx, mut file_rx) = mpsc::channel(100);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = file_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(&self.0, RecursiveMode::NonRecursive)?;

        let config_path = self.0.clone();
        tokio::spawn(async move {
            // The watcher stops emitting events once dropped, so it lives as long as this task.
            let _watcher = watcher;
            while let Some(res) = file_rx.recv().await {
                let update = match res {
                    Ok(event) if event.kind.is_modify() => {
                        info!("Upstreams file changed, reloading...");
                        Upstreams::from_config_file(&config_path).await
                    }
                    Ok(_) => continue,
                    Err(e) => Err(anyhow!("Watch error: {}", e)),
                };
                if let Err(e) = &update {
                    error!("Failed to reload upstreams: {}", e);
                }
                if upstreams_tx.send(update).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        Ok(upstreams_rx)
    }
}

impl Upstreams {
    pub async fn from_config_file(config_path: &PathBuf) -> Result<Self, anyhow::Error> {
        let contents = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            anyhow!(
                "Failed to read upstreams file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let config_file: ConfigFile = serde_json::from_str(&contents).map_err(|e| {
            anyhow!(
                "Failed to parse upstreams file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let upstreams = Self::from_config(config_file)?;

        info!(
            "Loaded {} upstreams from {}",
            upstreams.upstreams.len(),
            config_path.display()
        );
        Ok(upstreams)
    }

    pub fn from_config(config_file: ConfigFile) -> Result<Self, anyhow::Error> {
        for endpoint in Endpoint::ALL {
            if !config_file.upstreams.contains_key(endpoint.upstream()) {
                return Err(anyhow!(
                    "Upstream '{}' required by the {} endpoint is not configured",
                    endpoint.upstream(),
                    endpoint
                ));
            }
        }

        let upstreams = Arc::new(DashMap::new());
        for (name, upstream) in config_file.upstreams {
            debug!(
                "Upstream {} -> {} (key: {}, timeout: {:?})",
                name,
                upstream.url,
                upstream.backend_key.is_some(),
                upstream.timeout()
            );
            upstreams.insert(name, upstream);
        }

        Ok(Upstreams { upstreams })
    }

    pub fn get(&self, name: &str) -> Option<Upstream> {
        self.upstreams.get(name).map(|entry| entry.value().clone())
    }

    /// Receives updates from a stream of upstreams and updates the internal map in place.
    pub async fn receive_updates<W: UpstreamsStream + Send + 'static>(
        &self,
        upstreams_stream: W,
    ) -> Result<(), anyhow::Error> {
        let upstreams = Arc::clone(&self.upstreams);

        let mut rx = upstreams_stream.receive().await?;

        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(new_upstreams) => {
                        info!("Applying {} upstreams", new_upstreams.upstreams.len());
                        let current_names: Vec<String> =
                            upstreams.iter().map(|entry| entry.key().clone()).collect();

                        // Never clear the map: a request arriving mid-update must still find
                        // its upstream.
                        for name in current_names {
                            if !new_upstreams.upstreams.contains_key(&name) {
                                upstreams.remove(&name);
                            }
                        }

                        for entry in new_upstreams.upstreams.iter() {
                            upstreams.insert(entry.key().clone(), entry.value().clone());
                        }
                    }
                    Err(e) => {
                        error!("Keeping previous upstreams: {}", e);
                    }
                }
            }
        });

        Ok(())
    }
}
