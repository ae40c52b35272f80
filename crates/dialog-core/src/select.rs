use std::collections::HashSet;
use std::hash::Hash;

use dialog_backend::{GenerationOutput, Tokenizer};
use dialog_common::{DialogError, Result};

pub const UNFINISHED_PENALTY: f32 = 1e3;
pub const REPETITION_PENALTY: f32 = 1e3;

/// Cuts at the first `[SEP]` and maps ids to merged word pieces.
pub fn post_process_response(ids: &[u32], tokenizer: &dyn Tokenizer) -> (Vec<u32>, Vec<String>) {
    let sep = tokenizer.special_tokens().sep;
    let end = ids.iter().position(|&id| id == sep).unwrap_or(ids.len());
    let ids = ids[..end].to_vec();
    let tokens = tokenizer.merge_subword(tokenizer.convert_ids_to_tokens(&ids));
    (ids, tokens)
}

/// True when any trigram occurs twice. An empty response counts as repetitive.
pub fn has_in_turn_repetition<T: Eq + Hash>(items: &[T]) -> bool {
    if items.is_empty() {
        return true;
    }
    let mut seen = HashSet::new();
    items.windows(3).any(|tri| !seen.insert(tri))
}

fn char_repetition(tokens: &[String]) -> bool {
    let chars: Vec<char> = tokens.iter().flat_map(|t| t.chars().flat_map(char::to_lowercase)).collect();
    has_in_turn_repetition(&chars)
}

/// Picks one response per input from `num_samples` consecutive candidates.
/// Unfinished or self-repeating candidates are penalized; ties keep the earliest.
pub fn select_response(
    output: &GenerationOutput,
    tokenizer: &dyn Tokenizer,
    max_dec_len: Option<usize>,
    num_samples: usize,
) -> Result<Vec<String>> {
    if num_samples == 0 || output.ids.len() != output.scores.len() || output.ids.len() % num_samples != 0 {
        return Err(DialogError::Shape(format!(
            "{} candidates / {} scores cannot be grouped by {num_samples}",
            output.ids.len(),
            output.scores.len()
        )));
    }
    let mut results = Vec::with_capacity(output.ids.len() / num_samples);
    for (group_ids, group_scores) in output.ids.chunks(num_samples).zip(output.scores.chunks(num_samples)) {
        let mut best: Option<(String, f32)> = None;
        for (pred, &score) in group_ids.iter().zip(group_scores) {
            let (token_ids, tokens) = post_process_response(pred, tokenizer);
            let mut score = score;
            if max_dec_len.is_some_and(|max| token_ids.len() >= max) {
                score -= UNFINISHED_PENALTY;
            } else if char_repetition(&tokens) || has_in_turn_repetition(&token_ids) {
                score -= REPETITION_PENALTY;
            }
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((tokens.join(" "), score));
            }
        }
        if let Some((response, _)) = best {
            results.push(response);
        }
    }
    Ok(results)
}
