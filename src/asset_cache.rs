//! Offline asset cache for the console shell.
//!
//! Two strategies: navigations go network-first (then the cached URL, then
//! the cached shell document), static assets go cache-first. Entries are
//! keyed by a cache generation; activating a generation purges the others.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::DbState;
use crate::error::{AdminError, AdminResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: CachedResponse,
    pub source: ServedFrom,
}

#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> AdminResult<CachedResponse>;
}

pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(timeout: Duration) -> AdminResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdminError::Validation(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetch for HttpFetch {
    async fn fetch(&self, url: &str) -> AdminResult<CachedResponse> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AdminError::Timeout(url.to_string())
            } else {
                AdminError::Unreachable(format!("{url} ({e})"))
            }
        })?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| AdminError::Unreachable(format!("{url} ({e})")))?
            .to_vec();
        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}

pub struct AssetCache {
    db: Arc<DbState>,
    generation: String,
    shell_url: String,
    fetcher: Arc<dyn NetworkFetch>,
}

impl AssetCache {
    pub fn new(
        db: Arc<DbState>,
        generation: &str,
        shell_url: &str,
        fetcher: Arc<dyn NetworkFetch>,
    ) -> Self {
        Self {
            db,
            generation: generation.to_string(),
            shell_url: shell_url.to_string(),
            fetcher,
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    fn lookup(&self, url: &str) -> AdminResult<Option<CachedResponse>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT status, content_type, body FROM asset_cache
                     WHERE generation = ?1 AND url = ?2",
                    params![self.generation, url],
                    |row| {
                        Ok(CachedResponse {
                            status: row.get(0)?,
                            content_type: row.get(1)?,
                            body: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    fn store(&self, url: &str, resp: &CachedResponse) -> AdminResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO asset_cache (generation, url, status, content_type, body, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
                params![self.generation, url, resp.status, resp.content_type, resp.body],
            )?;
            Ok(())
        })
    }

    /// Precache `urls` (the shell document included). All or nothing: if
    /// any fetch fails, nothing is written.
    pub async fn install(&self, urls: &[String]) -> AdminResult<usize> {
        let mut fetched = Vec::with_capacity(urls.len() + 1);
        let shell = std::iter::once(&self.shell_url).filter(|s| !urls.contains(*s));
        for url in shell.chain(urls.iter()) {
            let resp = self.fetcher.fetch(url).await?;
            if !resp.is_success() {
                return Err(AdminError::Http {
                    status: resp.status,
                    message: format!("precache of {url} failed"),
                });
            }
            fetched.push((url.clone(), resp));
        }

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for (url, resp) in &fetched {
                tx.execute(
                    "INSERT OR REPLACE INTO asset_cache (generation, url, status, content_type, body, cached_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
                    params![self.generation, url, resp.status, resp.content_type, resp.body],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;
        info!(generation = %self.generation, count = fetched.len(), "asset cache installed");
        Ok(fetched.len())
    }

    /// Drop every entry that belongs to another generation.
    pub fn activate(&self) -> AdminResult<usize> {
        let purged = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM asset_cache WHERE generation <> ?1",
                params![self.generation],
            )?)
        })?;
        if purged > 0 {
            info!(generation = %self.generation, purged, "stale asset cache purged");
        }
        Ok(purged)
    }

    pub async fn serve(&self, url: &str, mode: RequestMode) -> AdminResult<Served> {
        match mode {
            RequestMode::Navigate => self.serve_navigation(url).await,
            RequestMode::Asset => self.serve_asset(url).await,
        }
    }

    async fn serve_navigation(&self, url: &str) -> AdminResult<Served> {
        match self.fetcher.fetch(url).await {
            Ok(resp) => {
                if resp.is_success() {
                    if let Err(e) = self.store(url, &resp) {
                        warn!(url, error = %e, "failed to refresh cached document");
                    }
                }
                Ok(Served {
                    response: resp,
                    source: ServedFrom::Network,
                })
            }
            Err(network_err) => {
                debug!(url, error = %network_err, "navigation offline, trying cache");
                if let Some(resp) = self.lookup(url)? {
                    return Ok(Served {
                        response: resp,
                        source: ServedFrom::Cache,
                    });
                }
                match self.lookup(&self.shell_url)? {
                    Some(resp) => Ok(Served {
                        response: resp,
                        source: ServedFrom::Shell,
                    }),
                    None => Err(network_err),
                }
            }
        }
    }

    async fn serve_asset(&self, url: &str) -> AdminResult<Served> {
        if let Some(resp) = self.lookup(url)? {
            return Ok(Served {
                response: resp,
                source: ServedFrom::Cache,
            });
        }
        let resp = self.fetcher.fetch(url).await?;
        if resp.is_success() {
            self.store(url, &resp)?;
        }
        Ok(Served {
            response: resp,
            source: ServedFrom::Network,
        })
    }
}
