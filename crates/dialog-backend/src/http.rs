//! Client for a local generation service speaking JSON over HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ensure_inference_mode, Batch, ExecutionMode, GenerationBackend, GenerationOutput, GenerationParams, LoadParams};
use dialog_common::{DialogError, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    input_ids: &'a [Vec<u32>],
    token_type_ids: &'a [Vec<u32>],
    position_ids: &'a [Vec<u32>],
    attention_mask: &'a [Vec<f32>],
    #[serde(flatten)]
    params: &'a GenerationParams,
    device: String,
    seed: u64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    ids: Vec<Vec<u32>>,
    scores: Vec<f32>,
}

pub struct HttpBackend {
    client: reqwest::blocking::Client,
    url: String,
    load: LoadParams,
    mode: ExecutionMode,
    grad_enabled: bool,
}

impl HttpBackend {
    pub fn new(endpoint: &str, load: LoadParams) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| DialogError::Transport(e.to_string()))?;
        let url = format!("{}/generate", endpoint.trim_end_matches('/'));
        Ok(Self { client, url, load, mode: ExecutionMode::Train, grad_enabled: true })
    }

    pub fn url(&self) -> &str { &self.url }
}

impl GenerationBackend for HttpBackend {
    fn set_mode(&mut self, mode: ExecutionMode) { self.mode = mode; }

    fn set_grad_enabled(&mut self, enabled: bool) { self.grad_enabled = enabled; }

    fn generate(&mut self, batch: &Batch, params: &GenerationParams) -> Result<GenerationOutput> {
        ensure_inference_mode(self.mode, self.grad_enabled)?;
        batch.validate()?;
        let body = GenerateRequest {
            input_ids: &batch.token_ids,
            token_type_ids: &batch.type_ids,
            position_ids: &batch.position_ids,
            attention_mask: &batch.attention_mask,
            params,
            device: self.load.device.to_string(),
            seed: self.load.seed,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| DialogError::Transport(e.to_string()))?;
        let reply: GenerateResponse = resp.json().map_err(|e| DialogError::Backend(format!("bad generate reply: {e}")))?;
        let expected = batch.rows() * params.num_return_sequences;
        if reply.ids.len() != expected || reply.scores.len() != expected {
            return Err(DialogError::Shape(format!(
                "service returned {} ids / {} scores, expected {expected}",
                reply.ids.len(),
                reply.scores.len()
            )));
        }
        Ok(GenerationOutput { ids: reply.ids, scores: reply.scores })
    }
}
