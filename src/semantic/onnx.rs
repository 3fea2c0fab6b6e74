//! ONNX transformer encoder with a Hugging Face tokenizer.
//!
//! Model files come from the hub cache (downloaded on first use) unless local
//! paths are configured.

use std::path::PathBuf;

use hf_hub::api::sync::Api;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::embeddings::{EmbeddingError, TokenEncoder, TokenStates};
use crate::config::EmbeddingConfig;

const TOKENIZER_FILE: &str = "tokenizer.json";
const ONNX_FILES: [&str; 2] = ["onnx/model.onnx", "model.onnx"];
const HIDDEN_STATE_OUTPUT: &str = "last_hidden_state";

fn map_ort_error(err: ort::Error) -> EmbeddingError {
    EmbeddingError::Inference(format!("onnx runtime error: {err}"))
}

pub struct OnnxEncoder {
    session: Session,
    tokenizer: Tokenizer,
    model_name: String,
    wants_token_type_ids: bool,
}

impl OnnxEncoder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let (model_path, tokenizer_path) = resolve_paths(config)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbeddingError::InitFailed(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::InitFailed(format!("tokenizer truncation: {e}")))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        let session = Session::builder()
            .map_err(map_ort_error)?
            .commit_from_file(&model_path)
            .map_err(|e| {
                EmbeddingError::InitFailed(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        let wants_token_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        log::info!("loaded embedding model {}", config.model);

        Ok(Self {
            session,
            tokenizer,
            model_name: config.model.clone(),
            wants_token_type_ids,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

impl TokenEncoder for OnnxEncoder {
    fn forward(&mut self, texts: &[&str]) -> Result<TokenStates, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenize(e.to_string()))?;

        let batch = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut input_ids: Vec<i64> = Vec::with_capacity(batch * seq_len);
        let mut attention_mask: Vec<u32> = Vec::with_capacity(batch * seq_len);
        let mut token_type_ids: Vec<i64> = Vec::with_capacity(batch * seq_len);

        for enc in &encodings {
            if enc.get_ids().len() != seq_len {
                return Err(EmbeddingError::Tokenize(
                    "tokenizer returned varying sequence lengths; enable padding".into(),
                ));
            }
            input_ids.extend(enc.get_ids().iter().map(|v| *v as i64));
            attention_mask.extend_from_slice(enc.get_attention_mask());
            token_type_ids.extend(enc.get_type_ids().iter().map(|v| *v as i64));
        }

        let mask_i64: Vec<i64> = attention_mask.iter().map(|v| *v as i64).collect();

        let mut inputs = vec![
            (
                "input_ids",
                Tensor::from_array(([batch, seq_len], input_ids)).map_err(map_ort_error)?,
            ),
            (
                "attention_mask",
                Tensor::from_array(([batch, seq_len], mask_i64)).map_err(map_ort_error)?,
            ),
        ];
        if self.wants_token_type_ids {
            inputs.push((
                "token_type_ids",
                Tensor::from_array(([batch, seq_len], token_type_ids)).map_err(map_ort_error)?,
            ));
        }

        let outputs = self.session.run(inputs).map_err(map_ort_error)?;

        let output = match outputs.get(HIDDEN_STATE_OUTPUT) {
            Some(value) => value,
            None => &outputs[0],
        };

        let (shape, data) = output.try_extract_tensor::<f32>().map_err(map_ort_error)?;
        let dims: &[i64] = shape;

        if dims.len() != 3 || dims[0] as usize != batch || dims[1] as usize != seq_len {
            return Err(EmbeddingError::Shape(format!(
                "expected [{batch}, {seq_len}, hidden], got {dims:?}"
            )));
        }

        Ok(TokenStates {
            batch,
            seq_len,
            hidden: dims[2] as usize,
            hidden_states: data.to_vec(),
            attention_mask,
        })
    }
}

/// Local override paths first, then the hub.
fn resolve_paths(config: &EmbeddingConfig) -> Result<(PathBuf, PathBuf), EmbeddingError> {
    if let Some(model_path) = &config.onnx_path {
        if !model_path.exists() {
            return Err(EmbeddingError::InitFailed(format!(
                "ONNX model path not found: {}",
                model_path.display()
            )));
        }

        let tokenizer_path = config
            .tokenizer_path
            .clone()
            .or_else(|| model_path.parent().map(|p| p.join(TOKENIZER_FILE)))
            .filter(|p| p.exists())
            .ok_or_else(|| {
                EmbeddingError::InitFailed("tokenizer path not found; set embedding.tokenizer_path".into())
            })?;

        return Ok((model_path.clone(), tokenizer_path));
    }

    let api = Api::new()
        .map_err(|e| EmbeddingError::InitFailed(format!("failed to init hf-hub: {e}")))?;
    let repo = api.model(config.model.clone());

    let tokenizer_path = match &config.tokenizer_path {
        Some(path) => path.clone(),
        None => repo.get(TOKENIZER_FILE).map_err(|e| {
            EmbeddingError::InitFailed(format!(
                "failed to download {TOKENIZER_FILE} from {}: {e}",
                config.model
            ))
        })?,
    };

    let mut last_err = None;
    for file in ONNX_FILES {
        match repo.get(file) {
            Ok(path) => return Ok((path, tokenizer_path)),
            Err(e) => last_err = Some(format!("{file}: {e}")),
        }
    }

    Err(EmbeddingError::InitFailed(format!(
        "failed to download ONNX model from {}: {}",
        config.model,
        last_err.unwrap_or_default()
    )))
}
