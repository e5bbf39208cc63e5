use crate::chunking::Chunk;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Anything that can turn text into a fixed-length vector
#[allow(async_fn_in_trait)]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// A chunk together with its embedding, the unit written to the index
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub embedding: Embedding,
    pub chunk: Chunk,
}

/// Embed chunks one at a time, in order
pub async fn embed_chunks<E: Embedder>(
    embedder: &E,
    chunks: Vec<Chunk>,
) -> Result<Vec<EmbeddedChunk>> {
    let mut records = Vec::with_capacity(chunks.len());
    let total = chunks.len();

    for (idx, chunk) in chunks.into_iter().enumerate() {
        let embedding = embedder
            .embed(&chunk.content)
            .await
            .with_context(|| format!("Failed to embed chunk {} of {}", idx + 1, total))?;
        debug!("Embedded chunk {}/{}", idx + 1, total);
        records.push(EmbeddedChunk { embedding, chunk });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chunk, HashEmbedder};

    #[tokio::test]
    async fn test_embed_chunks_keeps_order() {
        let embedder = HashEmbedder::new(8);
        let chunks = vec![
            chunk("first chunk", "a.pdf"),
            chunk("second chunk", "a.pdf"),
            chunk("third chunk", "b.pdf"),
        ];

        let records = embed_chunks(&embedder, chunks.clone()).await.unwrap();

        assert_eq!(embedder.calls(), 3);
        let contents: Vec<&Chunk> = records.iter().map(|r| &r.chunk).collect();
        assert_eq!(contents, chunks.iter().collect::<Vec<_>>());
        assert!(records.iter().all(|r| r.embedding.dimension() == 8));
    }
}
