use crate::chat::{ChatMessage, ChatModel};
use crate::chunking::Chunk;
use crate::context::{ChatHistory, QuestionCondenser};
use anyhow::Result;
use log::{debug, info};

/// System prompt for answering; `{question}` and `{context}` are substituted
pub const QA_PROMPT: &str = "You are a helpful assistant answering questions about a \
collection of documents. Use only the context below to answer. If the context does not \
contain the answer, say that you don't know.

Question: {question}

Context:
{context}";

/// Anything that can return the `k` chunks most relevant to a query
#[allow(async_fn_in_trait)]
pub trait Retriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

/// A generated answer and the files it was drawn from
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Distinct `source` values of the retrieved chunks, in retrieval order
    pub sources: Vec<String>,
}

/// Retrieve, compose, generate
pub struct RagChain<'a, R, C> {
    retriever: &'a R,
    chat: &'a C,
    top_k: usize,
}

impl<'a, R: Retriever, C: ChatModel> RagChain<'a, R, C> {
    pub fn new(retriever: &'a R, chat: &'a C, top_k: usize) -> Self {
        RagChain {
            retriever,
            chat,
            top_k,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let chunks = self.retriever.retrieve(question, self.top_k).await?;
        info!("Retrieved {} chunks", chunks.len());

        let context = compose_context(&chunks, self.top_k);
        let prompt = QA_PROMPT
            .replace("{question}", question)
            .replace("{context}", &context);

        let messages = [ChatMessage::system(prompt), ChatMessage::user(question)];
        let text = self.chat.complete(&messages).await?;

        Ok(Answer {
            text,
            sources: distinct_sources(&chunks),
        })
    }

    /// Answer a follow-up, first rewriting it into a standalone question when
    /// there is history to resolve it against
    pub async fn ask_with_history(&self, question: &str, history: &ChatHistory) -> Result<Answer> {
        if history.is_empty() {
            return self.ask(question).await;
        }

        let standalone = QuestionCondenser::new(self.chat)
            .condense(question, history)
            .await?;
        debug!("Standalone question: {}", standalone);

        self.ask(&standalone).await
    }
}

/// Chunk contents in retrieval order, at most `k` of them, separated by blank lines
pub fn compose_context(chunks: &[Chunk], k: usize) -> String {
    chunks
        .iter()
        .take(k)
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

fn distinct_sources(chunks: &[Chunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in chunks.iter().filter_map(Chunk::source) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
    sources
}
