pub mod gemini;

pub use gemini::{GeminiChat, GeminiClient, GeminiEmbedder};
