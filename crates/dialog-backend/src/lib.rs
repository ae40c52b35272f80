//! Generation capability seam: batches in, candidate ids and scores out.

use dialog_common::config::{DecodeStrategy, Device, InferConfig};
use dialog_common::{DialogError, Result};
use serde::Serialize;

pub mod hf;
pub mod http;
pub mod hub;
pub mod sampler;

pub use hub::{load_pretrained, LoadedModel, ModelManifest};

/// One model input step. Every array is `[rows][seq_len]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub token_ids: Vec<Vec<u32>>,
    pub type_ids: Vec<Vec<u32>>,
    pub position_ids: Vec<Vec<u32>>,
    pub attention_mask: Vec<Vec<f32>>,
}

impl Batch {
    pub fn rows(&self) -> usize { self.token_ids.len() }

    pub fn seq_len(&self) -> usize { self.token_ids.first().map_or(0, Vec::len) }

    pub fn validate(&self) -> Result<()> {
        let rows = self.rows();
        let counts = [self.type_ids.len(), self.position_ids.len(), self.attention_mask.len()];
        if counts.iter().any(|&n| n != rows) {
            return Err(DialogError::Shape(format!(
                "batch arrays disagree on row count: ids={rows}, type={}, pos={}, mask={}",
                counts[0], counts[1], counts[2]
            )));
        }
        let width = self.seq_len();
        for r in 0..rows {
            let lens = [
                self.token_ids[r].len(),
                self.type_ids[r].len(),
                self.position_ids[r].len(),
                self.attention_mask[r].len(),
            ];
            if lens.iter().any(|&n| n != width) {
                return Err(DialogError::Shape(format!(
                    "row {r} has lengths {lens:?}, expected {width}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_length: usize,
    pub min_length: usize,
    pub decode_strategy: DecodeStrategy,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub num_beams: usize,
    pub length_penalty: f32,
    pub early_stopping: bool,
    pub num_return_sequences: usize,
}

impl From<&InferConfig> for GenerationParams {
    fn from(cfg: &InferConfig) -> Self {
        Self {
            max_length: cfg.max_dec_len,
            min_length: cfg.min_dec_len,
            decode_strategy: cfg.decode_strategy,
            temperature: cfg.temperature,
            top_k: cfg.top_k,
            top_p: cfg.top_p,
            num_beams: cfg.num_beams,
            length_penalty: cfg.length_penalty,
            early_stopping: cfg.early_stopping,
            num_return_sequences: cfg.num_samples,
        }
    }
}

/// Candidates for one batch: `num_return_sequences` consecutive rows per input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub ids: Vec<Vec<u32>>,
    pub scores: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadParams {
    pub device: Device,
    pub seed: u64,
}

impl Default for LoadParams {
    fn default() -> Self { Self { device: Device::Cpu, seed: 0 } }
}

impl From<&InferConfig> for LoadParams {
    fn from(cfg: &InferConfig) -> Self { Self { device: cfg.device, seed: cfg.seed } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Train,
    Eval,
}

pub trait GenerationBackend: Send {
    fn set_mode(&mut self, mode: ExecutionMode);
    fn set_grad_enabled(&mut self, enabled: bool);
    fn generate(&mut self, batch: &Batch, params: &GenerationParams) -> Result<GenerationOutput>;
}

/// Generation is inference-only: eval mode, no gradient tracking.
pub fn ensure_inference_mode(mode: ExecutionMode, grad_enabled: bool) -> Result<()> {
    if mode != ExecutionMode::Eval || grad_enabled {
        return Err(DialogError::Backend(format!(
            "generate called outside inference mode (mode={mode:?}, grad_enabled={grad_enabled})"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub unk: u32,
    pub cls: u32,
    pub sep: u32,
}

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String>;
    fn special_tokens(&self) -> SpecialTokens;

    /// Sentencepiece merge: a `▁` prefix opens a word, anything else continues the previous one.
    fn merge_subword(&self, tokens: Vec<String>) -> Vec<String> {
        let mut merged: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token.strip_prefix('\u{2581}') {
                Some(word) => merged.push(word.to_string()),
                None => match merged.last_mut() {
                    Some(last) => last.push_str(&token),
                    None => merged.push(token),
                },
            }
        }
        merged.retain(|t| !t.is_empty());
        merged
    }
}

#[cfg(feature = "mock")]
pub mod mock;
