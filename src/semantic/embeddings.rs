//! Sentence embeddings from per-token transformer output.
//!
//! The pipeline matches the usual sentence-transformers recipe so vectors stay
//! compatible with ones produced elsewhere from the same weights:
//! - tokenize with truncation, pad to the longest text in the batch
//! - forward pass, keep the last hidden state
//! - mean over tokens weighted by the attention mask (count floored at 1e-9)
//! - L2-normalize

use std::sync::Mutex;

use super::DEFAULT_BATCH_SIZE;

/// Smallest token count used as a pooling divisor.
const MIN_MASK_COUNT: f32 = 1e-9;
/// Smallest norm used as a normalization divisor.
const MIN_NORM: f32 = 1e-12;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected encoder output: {0}")]
    Shape(String),
}

/// Last hidden state and attention mask for one padded batch.
///
/// `hidden_states` is row-major `[batch, seq_len, hidden]`, `attention_mask`
/// is `[batch, seq_len]` with 1 for real tokens and 0 for padding.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStates {
    pub batch: usize,
    pub seq_len: usize,
    pub hidden: usize,
    pub hidden_states: Vec<f32>,
    pub attention_mask: Vec<u32>,
}

impl TokenStates {
    fn check(&self) -> Result<(), EmbeddingError> {
        if self.hidden_states.len() != self.batch * self.seq_len * self.hidden {
            return Err(EmbeddingError::Shape(format!(
                "hidden states hold {} values, expected {}x{}x{}",
                self.hidden_states.len(),
                self.batch,
                self.seq_len,
                self.hidden
            )));
        }
        if self.attention_mask.len() != self.batch * self.seq_len {
            return Err(EmbeddingError::Shape(format!(
                "attention mask holds {} values, expected {}x{}",
                self.attention_mask.len(),
                self.batch,
                self.seq_len
            )));
        }
        Ok(())
    }
}

/// Tokenizer plus transformer forward pass, without gradient tracking.
pub trait TokenEncoder {
    fn forward(&mut self, texts: &[&str]) -> Result<TokenStates, EmbeddingError>;
}

/// Attention-mask-weighted mean over the token axis, one vector per batch row.
pub fn mean_pool(states: &TokenStates) -> Vec<Vec<f32>> {
    let TokenStates {
        batch,
        seq_len,
        hidden,
        ..
    } = *states;

    (0..batch)
        .map(|b| {
            let mut summed = vec![0f32; hidden];
            let mut count = 0f32;

            for t in 0..seq_len {
                let mask = states.attention_mask[b * seq_len + t] as f32;
                if mask == 0.0 {
                    continue;
                }
                count += mask;

                let start = (b * seq_len + t) * hidden;
                for (acc, v) in summed
                    .iter_mut()
                    .zip(&states.hidden_states[start..start + hidden])
                {
                    *acc += v * mask;
                }
            }

            let count = count.max(MIN_MASK_COUNT);
            summed.iter_mut().for_each(|v| *v /= count);
            summed
        })
        .collect()
}

pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt().max(MIN_NORM);
    for v in vec {
        *v /= norm;
    }
}

/// Batched text encoder producing fixed-length, unit-length vectors.
/// Uses a Mutex because a forward pass needs `&mut` access to the encoder.
pub struct EmbeddingEngine<E> {
    encoder: Mutex<E>,
    batch_size: usize,
}

impl<E: TokenEncoder> EmbeddingEngine<E> {
    pub fn new(encoder: E) -> Self {
        Self::with_batch_size(encoder, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(encoder: E, batch_size: usize) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode_chunk(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Shape("no embedding returned".into()))
    }

    /// One vector per input, in input order, using the configured batch size.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.encode_batch_with(texts, self.batch_size)
    }

    /// Batches run strictly one after another; `batch_size` only affects
    /// throughput and padding length.
    pub fn encode_batch_with(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut out = Vec::with_capacity(texts.len());

        for (idx, chunk) in texts.chunks(batch_size).enumerate() {
            let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
            out.extend(self.encode_chunk(&refs)?);
            log::debug!("embedded batch {}/{total_batches}", idx + 1);
        }

        Ok(out)
    }

    fn encode_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let states = {
            let mut encoder = self.encoder.lock().map_err(|e| {
                EmbeddingError::Inference(format!("Failed to acquire encoder lock: {}", e))
            })?;
            encoder.forward(texts)?
        };

        states.check()?;
        if states.batch != texts.len() {
            return Err(EmbeddingError::Shape(format!(
                "{} texts in, {} rows out",
                texts.len(),
                states.batch
            )));
        }

        let mut pooled = mean_pool(&states);
        pooled.iter_mut().for_each(|v| l2_normalize(v));
        Ok(pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(hidden_states: Vec<f32>, attention_mask: Vec<u32>, batch: usize, seq_len: usize) -> TokenStates {
        let hidden = hidden_states.len() / (batch * seq_len);
        TokenStates {
            batch,
            seq_len,
            hidden,
            hidden_states,
            attention_mask,
        }
    }

    #[test]
    fn mean_pool_ignores_padding() {
        // one row: two real tokens then one padding token with huge values
        let s = states(
            vec![1.0, 2.0, 3.0, 4.0, 1000.0, -1000.0],
            vec![1, 1, 0],
            1,
            3,
        );
        assert_eq!(mean_pool(&s), vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn mean_pool_all_masked_is_zero_not_nan() {
        let s = states(vec![5.0, 5.0], vec![0], 1, 1);
        let pooled = mean_pool(&s);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn l2_normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.6, 0.8]);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let s = TokenStates {
            batch: 1,
            seq_len: 2,
            hidden: 2,
            hidden_states: vec![0.0; 3],
            attention_mask: vec![1, 1],
        };
        assert!(matches!(s.check(), Err(EmbeddingError::Shape(_))));
    }
}
