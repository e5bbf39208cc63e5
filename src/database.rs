use crate::chunking::Chunk;
use crate::config::QdrantConfig;
use crate::document::Metadata;
use crate::embeddings::{EmbeddedChunk, Embedding};
use anyhow::{Context, Result};
use log::debug;
use qdrant_client::qdrant::{
    with_payload_selector, CreateCollectionBuilder, Distance, PointStruct, SearchPoints,
    UpsertPointsBuilder, Value, VectorParams, WithPayloadSelector,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;

/// Storage and nearest-neighbour search over embedded chunks
#[allow(async_fn_in_trait)]
pub trait VectorBackend {
    async fn create_collection(&self, name: &str, dimension: u64) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Write all records and wait until they are persisted
    async fn store_chunks(&self, name: &str, records: Vec<EmbeddedChunk>) -> Result<()>;

    /// Chunks nearest to `query`, most similar first
    async fn search(&self, name: &str, query: Embedding, limit: u64) -> Result<Vec<Chunk>>;
}

/// Client for interacting with Qdrant
pub struct QdrantClient {
    client: Qdrant,
}

impl QdrantClient {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;

        Ok(QdrantClient { client })
    }
}

impl VectorBackend for QdrantClient {
    async fn create_collection(&self, name: &str, dimension: u64) -> Result<()> {
        let create_collection =
            CreateCollectionBuilder::new(name).vectors_config(VectorParams {
                size: dimension,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", name))?;

        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client
            .delete_collection(name)
            .await
            .with_context(|| format!("Failed to delete collection {}", name))?;

        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        match self.client.collection_info(name).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    async fn store_chunks(&self, name: &str, records: Vec<EmbeddedChunk>) -> Result<()> {
        let mut points = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let payload = chunk_payload(&record.chunk)?;
            points.push(PointStruct::new(
                idx as u64,
                record.embedding.values,
                payload,
            ));
        }

        debug!("Upserting {} points into {}", points.len(), name);

        // wait=true returns only once the points are persisted
        let upsert_request = UpsertPointsBuilder::new(name, points).wait(true).build();

        self.client
            .upsert_points(upsert_request)
            .await
            .with_context(|| format!("Failed to upsert points in collection {}", name))?;

        Ok(())
    }

    async fn search(&self, name: &str, query: Embedding, limit: u64) -> Result<Vec<Chunk>> {
        let search_request = SearchPoints {
            collection_name: name.to_string(),
            vector: query.values,
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", name))?;

        // Results arrive ordered by score
        search_response
            .result
            .into_iter()
            .map(|scored_point| chunk_from_payload(&scored_point.payload))
            .collect()
    }
}

/// Chunk payload; metadata is kept as JSON text so arbitrary values survive the round trip
fn chunk_payload(chunk: &Chunk) -> Result<HashMap<String, Value>> {
    let metadata =
        serde_json::to_string(&chunk.metadata).context("Failed to serialize chunk metadata")?;

    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("content".to_string(), chunk.content.clone().into());
    payload.insert("metadata".to_string(), metadata.into());
    payload.insert(
        "start_position".to_string(),
        (chunk.start_position as i64).into(),
    );

    Ok(payload)
}

fn chunk_from_payload(payload: &HashMap<String, Value>) -> Result<Chunk> {
    let content = payload
        .get("content")
        .and_then(|v| v.as_str())
        .context("Stored point has no content")?
        .to_string();

    let metadata: Metadata = match payload.get("metadata").and_then(|v| v.as_str()) {
        Some(raw) => serde_json::from_str(raw).context("Stored point has invalid metadata")?,
        None => Metadata::new(),
    };

    let start_position = payload
        .get("start_position")
        .and_then(|v| v.as_integer())
        .map(|v| v as usize)
        .unwrap_or(0);

    Ok(Chunk {
        content,
        metadata,
        start_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::chunk;

    #[test]
    fn test_payload_round_trip() {
        let mut original = chunk("Some text", "data/docs/a.pdf");
        original.start_position = 800;
        original
            .metadata
            .insert("languages".to_string(), serde_json::json!(["eng"]));

        let payload = chunk_payload(&original).unwrap();
        let restored = chunk_from_payload(&payload).unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn test_payload_without_content_is_rejected() {
        let payload: HashMap<String, Value> = HashMap::new();
        assert!(chunk_from_payload(&payload).is_err());
    }
}
