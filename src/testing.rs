//! In-memory stand-ins for the external services, shared by unit tests.

use crate::chat::{ChatMessage, ChatModel};
use crate::chunking::Chunk;
use crate::database::VectorBackend;
use crate::document::{Element, FileKind, Metadata, Partitioner, SOURCE_KEY};
use crate::embeddings::{EmbeddedChunk, Embedder, Embedding};
use crate::rag::Retriever;
use anyhow::Result;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn chunk(content: &str, source: &str) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), Value::String(source.to_string()));
    Chunk {
        content: content.to_string(),
        metadata,
        start_position: 0,
    }
}

/// Partitioner answering from a table keyed by file name
#[derive(Default)]
pub struct StaticPartitioner {
    results: HashMap<String, Result<Vec<Element>, String>>,
    calls: Mutex<Vec<String>>,
}

impl StaticPartitioner {
    pub fn with_elements(self, file_name: &str, texts: &[&str]) -> Self {
        texts.iter().fold(self, |partitioner, text| {
            partitioner.with_element(
                file_name,
                Element {
                    text: text.to_string(),
                    metadata: Metadata::new(),
                },
            )
        })
    }

    pub fn with_element(mut self, file_name: &str, element: Element) -> Self {
        if let Ok(elements) = self
            .results
            .entry(file_name.to_string())
            .or_insert_with(|| Ok(Vec::new()))
        {
            elements.push(element);
        }
        self
    }

    pub fn with_failure(mut self, file_name: &str, error: &str) -> Self {
        self.results
            .insert(file_name.to_string(), Err(error.to_string()));
        self
    }

    /// File names passed to `partition`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Partitioner for StaticPartitioner {
    async fn partition(&self, path: &Path, _kind: FileKind) -> Result<Vec<Element>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().unwrap().push(name.clone());

        match self.results.get(&name) {
            Some(Ok(elements)) => Ok(elements.clone()),
            Some(Err(error)) => Err(anyhow::anyhow!("API request failed: {}", error)),
            None => Ok(Vec::new()),
        }
    }
}

/// Deterministic bag-of-words embedder: each word bumps one hashed bucket
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashEmbedder {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        HashEmbedder::new(32)
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut values = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
            values[hash as usize % self.dimension] += 1.0;
        }

        Ok(Embedding { values })
    }
}

/// Chat model replaying canned replies and recording every request
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn replying(replies: &[&str]) -> Self {
        ScriptedChat {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        ScriptedChat {
            replies: Mutex::new(VecDeque::from([Err(error.to_string())])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatModel for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let mut replies = self.replies.lock().unwrap();
        // The last reply repeats once the script runs out
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(error)) => Err(anyhow::anyhow!("API request failed: {}", error)),
            None => Err(anyhow::anyhow!("No response generated")),
        }
    }
}

/// Vector backend keeping collections in memory with brute-force cosine search
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Vec<EmbeddedChunk>>>,
    searches: AtomicUsize,
}

impl MemoryBackend {
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorBackend for MemoryBackend {
    async fn create_collection(&self, name: &str, _dimension: u64) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(name) {
            anyhow::bail!("Collection {} already exists", name);
        }
        collections.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn store_chunks(&self, name: &str, records: Vec<EmbeddedChunk>) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("Collection {} not found", name))?;
        collection.extend(records);
        Ok(())
    }

    async fn search(&self, name: &str, query: Embedding, limit: u64) -> Result<Vec<Chunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let collections = self.collections.lock().unwrap();
        let collection = collections
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Collection {} not found", name))?;

        let mut scored: Vec<(f32, &EmbeddedChunk)> = collection
            .iter()
            .map(|record| (cosine(&query.values, &record.embedding.values), record))
            .collect();
        // Stable sort keeps insertion order for ties
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, record)| record.chunk.clone())
            .collect())
    }
}

/// Retriever returning a fixed list, truncated to `k`
pub struct StaticRetriever {
    chunks: Vec<Chunk>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        StaticRetriever {
            chunks,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}
