use crate::chat::ChatModel;
use crate::chunking::{Splitter, SplitterConfig};
use crate::config::Settings;
use crate::context::ChatHistory;
use crate::database::VectorBackend;
use crate::document::{load_documents, FileFailure, Partitioner};
use crate::embeddings::Embedder;
use crate::rag::{Answer, RagChain};
use crate::vectorstore::{index_exists, VectorStore};
use anyhow::Result;
use log::info;

/// Summary of a "Build Index" run
#[derive(Debug)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    /// Files skipped because partitioning failed
    pub failures: Vec<FileFailure>,
    pub collection: String,
}

#[derive(Debug)]
pub enum AskOutcome {
    /// No index on disk; nothing was retrieved or generated
    IndexMissing,
    Answered(Answer),
}

/// Load, split, embed and publish every supported file in the data directory
pub async fn build_index<P, E, B>(
    settings: &Settings,
    partitioner: &P,
    embedder: &E,
    backend: &B,
) -> Result<BuildReport>
where
    P: Partitioner,
    E: Embedder,
    B: VectorBackend,
{
    info!("Loading documents from {}", settings.data_dir.display());
    let report = load_documents(&settings.data_dir, partitioner).await?;

    let splitter = Splitter::new(SplitterConfig::from_settings(settings))?;
    let chunks = splitter.split_documents(&report.documents);
    info!(
        "Split {} documents into {} chunks",
        report.documents.len(),
        chunks.len()
    );

    let chunk_count = chunks.len();
    let store = VectorStore::build(backend, embedder, settings, chunks).await?;

    Ok(BuildReport {
        documents: report.documents.len(),
        chunks: chunk_count,
        failures: report.failures,
        collection: store.manifest().collection.clone(),
    })
}

/// Answer `question` from the index, condensing it against `history` first.
///
/// Refuses without touching any service when the index has not been built.
pub async fn ask<E, C, B>(
    settings: &Settings,
    embedder: &E,
    chat: &C,
    backend: &B,
    question: &str,
    history: &ChatHistory,
) -> Result<AskOutcome>
where
    E: Embedder,
    C: ChatModel,
    B: VectorBackend,
{
    if !index_exists(&settings.vectorstore_dir) {
        info!(
            "No index at {}, not answering",
            settings.vectorstore_dir.display()
        );
        return Ok(AskOutcome::IndexMissing);
    }

    let store = VectorStore::load(backend, embedder, settings).await?;
    let chain = RagChain::new(&store, chat, settings.top_k);
    let answer = chain.ask_with_history(question, history).await?;

    Ok(AskOutcome::Answered(answer))
}
