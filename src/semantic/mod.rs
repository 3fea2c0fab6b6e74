//! Description embeddings.
//!
//! - `embeddings`: batching, attention-masked mean pooling and L2 normalization
//!   over any [`TokenEncoder`]
//! - `onnx`: the production encoder, an ONNX transformer plus its tokenizer

pub mod embeddings;
pub mod onnx;

pub use embeddings::{EmbeddingEngine, EmbeddingError, TokenEncoder, TokenStates};
pub use onnx::OnnxEncoder;

/// Default number of texts per forward pass
pub const DEFAULT_BATCH_SIZE: usize = 32;
