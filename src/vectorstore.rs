//! The persistent index: a directory holding a manifest that names the live
//! backend collection. The manifest existing is what "index built" means.

use crate::chunking::Chunk;
use crate::config::Settings;
use crate::database::VectorBackend;
use crate::embeddings::{embed_chunks, Embedder};
use crate::rag::Retriever;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";
const COLLECTION_PREFIX: &str = "docs_rag";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Vector store not found at {0}")]
    NotFound(PathBuf),
    #[error("Index was built with embedding model {built} but {configured} is configured")]
    ModelMismatch { built: String, configured: String },
    #[error("Collection {0} named by the index manifest no longer exists")]
    MissingCollection(String),
    #[error("Nothing to index: no chunks were produced")]
    Empty,
}

/// What the index directory records about the live collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub collection: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
}

impl Manifest {
    fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse index manifest: {}", path.display()))
    }

    fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write index manifest: {}", path.display()))
    }
}

/// A built index, opened for retrieval
pub struct VectorStore<'a, B, E> {
    backend: &'a B,
    embedder: &'a E,
    manifest: Manifest,
}

/// Whether an index has been built at `dir`
pub fn index_exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

impl<'a, B: VectorBackend, E: Embedder> VectorStore<'a, B, E> {
    /// Embed `chunks` into a fresh collection and publish it as the index.
    ///
    /// The previous index stays readable until the new manifest is swapped in;
    /// its collection is dropped afterwards.
    pub async fn build(
        backend: &'a B,
        embedder: &'a E,
        settings: &Settings,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(StoreError::Empty.into());
        }

        info!("Generating embeddings for {} chunks...", chunks.len());
        let records = embed_chunks(embedder, chunks).await?;

        let dimension = records[0].embedding.dimension();
        if let Some(bad) = records
            .iter()
            .find(|r| r.embedding.dimension() != dimension)
        {
            anyhow::bail!(
                "Embedding dimensions disagree: {} and {}",
                dimension,
                bad.embedding.dimension()
            );
        }

        let manifest = Manifest {
            collection: format!("{}_{}", COLLECTION_PREFIX, Uuid::new_v4().simple()),
            embedding_model: settings.openai.embedding_model.clone(),
            dimension,
            chunk_count: records.len(),
        };

        backend
            .create_collection(&manifest.collection, dimension as u64)
            .await?;
        if let Err(e) = backend.store_chunks(&manifest.collection, records).await {
            if let Err(cleanup) = backend.delete_collection(&manifest.collection).await {
                warn!("Failed to drop incomplete collection: {:#}", cleanup);
            }
            return Err(e);
        }

        let previous = match publish(&settings.vectorstore_dir, &manifest) {
            Ok(previous) => previous,
            Err(e) => {
                if let Err(cleanup) = backend.delete_collection(&manifest.collection).await {
                    warn!("Failed to drop unpublished collection: {:#}", cleanup);
                }
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            if previous.collection != manifest.collection {
                if let Err(e) = backend.delete_collection(&previous.collection).await {
                    warn!(
                        "Failed to drop previous collection {}: {:#}",
                        previous.collection, e
                    );
                }
            }
        }

        info!(
            "Index built: {} chunks in {}",
            manifest.chunk_count, manifest.collection
        );

        Ok(VectorStore {
            backend,
            embedder,
            manifest,
        })
    }

    /// Open the index at the configured directory
    pub async fn load(backend: &'a B, embedder: &'a E, settings: &Settings) -> Result<Self> {
        let dir = &settings.vectorstore_dir;
        if !index_exists(dir) {
            return Err(StoreError::NotFound(dir.clone()).into());
        }

        let manifest = Manifest::read(dir)?;

        if manifest.embedding_model != settings.openai.embedding_model {
            return Err(StoreError::ModelMismatch {
                built: manifest.embedding_model,
                configured: settings.openai.embedding_model.clone(),
            }
            .into());
        }

        if !backend.collection_exists(&manifest.collection).await? {
            return Err(StoreError::MissingCollection(manifest.collection).into());
        }

        debug!("Opened index {}", manifest.collection);

        Ok(VectorStore {
            backend,
            embedder,
            manifest,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

impl<B: VectorBackend, E: Embedder> Retriever for VectorStore<'_, B, E> {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        self.backend
            .search(&self.manifest.collection, query_embedding, k as u64)
            .await
    }
}

/// Replace the manifest in `dir` with `manifest`, returning the one it replaced.
///
/// The new manifest is written to a temporary file in the same directory and
/// renamed over the old one, so readers see either the old or the new file.
fn publish(dir: &Path, manifest: &Manifest) -> Result<Option<Manifest>> {
    let previous = if index_exists(dir) {
        match Manifest::read(dir) {
            Ok(previous) => Some(previous),
            Err(e) => {
                warn!("Replacing unreadable index: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let target = dir.join(MANIFEST_FILE);
    let staging = dir.join(format!(
        ".{}.{}.tmp",
        MANIFEST_FILE,
        Uuid::new_v4().simple()
    ));
    manifest.write(&staging)?;

    if let Err(e) = fs::rename(&staging, &target) {
        if let Err(cleanup) = fs::remove_file(&staging) {
            warn!("Failed to remove {}: {}", staging.display(), cleanup);
        }
        return Err(e)
            .with_context(|| format!("Failed to publish index at {}", dir.display()));
    }

    Ok(previous)
}
