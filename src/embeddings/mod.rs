// Embeddings module
// Client for OpenAI-compatible embedding APIs

pub mod openai;

pub use openai::EmbeddingClient;
