pub mod chat;
pub mod chunking;
pub mod config;
pub mod context;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod openai;
pub mod pipeline;
pub mod rag;
pub mod unstructured;
pub mod vectorstore;

#[cfg(test)]
mod testing;
