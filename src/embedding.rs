//! # Embedding providers
//!
//! The vector index and the retriever never own an embedding model: they take
//! a `&dyn Embedder` built once per process by [`create_embedder`] and passed
//! down explicitly.
//!
//! Two providers ship with the crate:
//! - [`SentenceEmbeddingsModel`]: `all-MiniLM-L6-v2` run locally with Candle
//!   (384-d, mean pooled, L2 normalised). Weights come from the Hugging Face hub
//!   cache on first use.
//! - [`HashingEmbedder`]: a deterministic bag-of-words hasher. No download, no
//!   model; good enough for keyword-heavy timetable text and used by the tests.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::error::Error;
use tokenizers::Tokenizer;

use crate::config::{EdtConfig, EmbeddingBackend};

/// Something that maps text to a fixed-length vector.
///
/// Implementations must return vectors of exactly [`dimension`](Self::dimension)
/// values for the whole process lifetime; exact values may vary.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>>;

    fn dimension(&self) -> usize;

    /// Recorded in the index manifest.
    fn model_name(&self) -> &str;
}

/// Build the provider selected in the configuration.
///
/// # Errors
/// Propagates model download/load failures for [`EmbeddingBackend::MiniLm`].
pub fn create_embedder(config: &EdtConfig) -> Result<Box<dyn Embedder>, Box<dyn Error>> {
    match config.embedding_backend {
        EmbeddingBackend::MiniLm => Ok(Box::new(SentenceEmbeddingsModel::load()?)),
        EmbeddingBackend::Hashing => Ok(Box::new(HashingEmbedder::new(config.embedding_dimension))),
    }
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEmbeddingsModel {
    pub const MODEL_ID: &'static str = "sentence-transformers/all-MiniLM-L6-v2";
    pub const DIMENSION: usize = 384;

    /// Load the model from the Hugging Face Hub (or its local cache).
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let device = Device::Cpu;

        let repo = Repo::with_revision(Self::MODEL_ID.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        tracing::info!("Loaded embedding model {}", Self::MODEL_ID);

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor, Box<dyn Error>> {
        // embeddings: [1, seq_len, hidden]; mask reshaped to [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }

    fn normalize(&self, tensor: &Tensor) -> Result<Tensor, Box<dyn Error>> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        // Truncation at 512 tokens is handled by the tokenizer config.
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {}", e))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = self.normalize(&embedding)?;

        Ok(embedding.to_vec1::<f32>()?)
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn model_name(&self) -> &str {
        Self::MODEL_ID
    }
}

/// Deterministic offline embedder.
///
/// Lower-cased words are hashed with blake3 into `dimension` signed buckets and
/// the result is L2 normalised. Text without any word embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
        let mut vector = vec![0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "blake3-hashing"
    }
}
