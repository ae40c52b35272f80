use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use dialog_backend::{Batch, Tokenizer};
use dialog_common::{DialogError, Result};

/// One encoded dialogue context ending in the response-start `[CLS]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedExample {
    pub token_ids: Vec<u32>,
    pub type_ids: Vec<u32>,
    pub position_ids: Vec<u32>,
}

impl EncodedExample {
    pub fn len(&self) -> usize { self.token_ids.len() }

    pub fn is_empty(&self) -> bool { self.token_ids.is_empty() }
}

/// `[CLS] turn [SEP] ... turn [SEP] [CLS]`, oldest context tokens dropped first.
pub fn encode_dialogue(turns: &[&str], tokenizer: &dyn Tokenizer, max_seq_len: usize) -> Result<EncodedExample> {
    let special = tokenizer.special_tokens();
    let mut context = Vec::new();
    for turn in turns {
        context.extend(tokenizer.encode(turn.trim())?);
        context.push(special.sep);
    }
    let budget = max_seq_len.saturating_sub(2);
    if context.len() > budget {
        context.drain(..context.len() - budget);
    }
    let mut token_ids = Vec::with_capacity(context.len() + 2);
    token_ids.push(special.cls);
    token_ids.extend(context);
    let mut type_ids = vec![0; token_ids.len()];
    token_ids.push(special.cls);
    type_ids.push(1);
    let position_ids = (0..token_ids.len() as u32).collect();
    Ok(EncodedExample { token_ids, type_ids, position_ids })
}

/// Reads an already-tokenized line: `token_ids;type_ids;position_ids`, each a
/// space-separated list of ids. Extra columns are ignored. Returns `None` when the
/// line is not in that form.
pub fn parse_pretokenized(line: &str) -> Option<Result<EncodedExample>> {
    let mut columns = Vec::with_capacity(3);
    for column in line.trim().split(';').take(3) {
        let ids: Option<Vec<u32>> = column.split_whitespace().map(|v| v.parse().ok()).collect();
        columns.push(ids.filter(|ids| !ids.is_empty())?);
    }
    let [token_ids, type_ids, position_ids]: [Vec<u32>; 3] = columns.try_into().ok()?;
    if token_ids.len() != type_ids.len() || token_ids.len() != position_ids.len() {
        return Some(Err(DialogError::Shape(format!(
            "{} token ids, {} type ids, {} position ids",
            token_ids.len(),
            type_ids.len(),
            position_ids.len()
        ))));
    }
    Some(Ok(EncodedExample { token_ids, type_ids, position_ids }))
}

/// Test-mode dialogue data, one example per non-blank line. A line is either
/// pre-tokenized (see [`parse_pretokenized`]) or raw text with tab-separated turns.
pub struct DialogueDataset {
    examples: Vec<EncodedExample>,
    batch_size: usize,
    pad_id: u32,
}

impl DialogueDataset {
    pub fn from_file(path: &Path, batch_size: usize, max_seq_len: usize, tokenizer: &dyn Tokenizer) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), batch_size, max_seq_len, tokenizer)
    }

    pub fn from_reader<R: BufRead>(reader: R, batch_size: usize, max_seq_len: usize, tokenizer: &dyn Tokenizer) -> Result<Self> {
        if batch_size == 0 {
            return Err(DialogError::Config("batch_size must be positive".into()));
        }
        let mut examples = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let example = match parse_pretokenized(&line) {
                Some(parsed) => parsed,
                None => {
                    let turns: Vec<&str> = line.split('\t').collect();
                    encode_dialogue(&turns, tokenizer, max_seq_len)
                }
            }
            .map_err(|e| DialogError::Data { line: idx + 1, message: e.to_string() })?;
            examples.push(example);
        }
        tracing::debug!(target: "infer", "loaded {} examples", examples.len());
        Ok(Self { examples, batch_size, pad_id: tokenizer.special_tokens().pad })
    }

    pub fn len(&self) -> usize { self.examples.len() }

    pub fn is_empty(&self) -> bool { self.examples.is_empty() }

    /// Batches in input order, right-padded to the longest example of each batch.
    pub fn batches(&self) -> impl Iterator<Item = Batch> + '_ {
        self.examples.chunks(self.batch_size).map(move |chunk| pad_batch(chunk, self.pad_id))
    }
}

fn pad_batch(examples: &[EncodedExample], pad_id: u32) -> Batch {
    let width = examples.iter().map(EncodedExample::len).max().unwrap_or(0);
    let mut batch = Batch::default();
    for ex in examples {
        let pad = width - ex.len();
        let mut ids = ex.token_ids.clone();
        ids.extend(std::iter::repeat(pad_id).take(pad));
        let mut types = ex.type_ids.clone();
        types.extend(std::iter::repeat(0).take(pad));
        let mut pos = ex.position_ids.clone();
        pos.extend(std::iter::repeat(0).take(pad));
        let mut mask = vec![1.0_f32; ex.len()];
        mask.extend(std::iter::repeat(0.0).take(pad));
        batch.token_ids.push(ids);
        batch.type_ids.push(types);
        batch.position_ids.push(pos);
        batch.attention_mask.push(mask);
    }
    batch
}
