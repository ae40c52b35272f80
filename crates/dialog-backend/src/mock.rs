use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::sampler::{log_softmax, sample_top_k_top_p};

/// Ids below this are reserved for special tokens.
pub const FIRST_CHAR_ID: u32 = 4;

const SPECIALS: SpecialTokens = SpecialTokens { pad: 0, unk: 1, cls: 2, sep: 3 };
const SPECIAL_NAMES: [&str; 4] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]"];

/// Character-level tokenizer: one id per non-whitespace char.
#[derive(Debug, Default, Clone)]
pub struct MockTokenizer;

impl MockTokenizer { pub fn new() -> Self { Self } }

impl Tokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().filter(|c| !c.is_whitespace()).map(|c| c as u32 + FIRST_CHAR_ID).collect())
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|&id| match id.checked_sub(FIRST_CHAR_ID) {
                None => SPECIAL_NAMES[id as usize].to_string(),
                Some(cp) => char::from_u32(cp).map_or_else(|| SPECIAL_NAMES[1].to_string(), String::from),
            })
            .collect()
    }

    fn special_tokens(&self) -> SpecialTokens { SPECIALS }

    fn merge_subword(&self, tokens: Vec<String>) -> Vec<String> { tokens }
}

/// Deterministic in-process generator that recombines characters of the context.
pub struct MockBackend {
    mode: ExecutionMode,
    grad_enabled: bool,
    seed: u64,
    calls: u64,
}

impl MockBackend {
    pub fn new(params: LoadParams) -> Self {
        Self { mode: ExecutionMode::Train, grad_enabled: true, seed: params.seed, calls: 0 }
    }

    fn decode_one(&self, vocab: &[(u32, f32)], params: &GenerationParams, rng: &mut StdRng) -> (Vec<u32>, f32) {
        if vocab.is_empty() {
            return (vec![SPECIALS.sep], 0.0);
        }
        let logits: Vec<f32> = vocab.iter().map(|(_, l)| *l).collect();
        let log_probs = log_softmax(&logits, params.temperature);
        let min = params.min_length.max(1).min(params.max_length);
        let len = match params.decode_strategy {
            DecodeStrategy::GreedySearch => vocab.len().clamp(min, params.max_length),
            DecodeStrategy::Sampling | DecodeStrategy::BeamSearch => rng.gen_range(min..=params.max_length),
        };
        let mut ids = Vec::with_capacity(len + 1);
        let mut total = 0.0_f32;
        for step in 0..len {
            let pick = match params.decode_strategy {
                DecodeStrategy::GreedySearch => step % vocab.len(),
                DecodeStrategy::Sampling => sample_top_k_top_p(rng, &logits, params.top_k, params.top_p, params.temperature),
                DecodeStrategy::BeamSearch => sample_top_k_top_p(rng, &logits, params.num_beams, 1.0, params.temperature),
            };
            ids.push(vocab[pick].0);
            total += log_probs[pick];
        }
        if len < params.max_length {
            ids.push(SPECIALS.sep);
        }
        let norm = (len as f32).powf(params.length_penalty).max(1.0);
        (ids, total / norm)
    }
}

impl GenerationBackend for MockBackend {
    fn set_mode(&mut self, mode: ExecutionMode) { self.mode = mode; }

    fn set_grad_enabled(&mut self, enabled: bool) { self.grad_enabled = enabled; }

    fn generate(&mut self, batch: &Batch, params: &GenerationParams) -> Result<GenerationOutput> {
        ensure_inference_mode(self.mode, self.grad_enabled)?;
        batch.validate()?;
        let mut out = GenerationOutput::default();
        for (row, (tokens, mask)) in batch.token_ids.iter().zip(&batch.attention_mask).enumerate() {
            // frequency of each context char, first-seen order
            let mut vocab: Vec<(u32, f32)> = Vec::new();
            for (&id, &m) in tokens.iter().zip(mask) {
                if m == 0.0 || id < FIRST_CHAR_ID { continue; }
                match vocab.iter_mut().find(|(t, _)| *t == id) {
                    Some(entry) => entry.1 += 1.0,
                    None => vocab.push((id, 1.0)),
                }
            }
            for j in 0..params.num_return_sequences {
                let stream = (self.calls << 40) ^ ((row as u64) << 20) ^ j as u64;
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ stream);
                let (ids, score) = self.decode_one(&vocab, params, &mut rng);
                out.ids.push(ids);
                out.scores.push(score);
            }
        }
        self.calls += 1;
        Ok(out)
    }
}
