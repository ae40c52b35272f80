//! Batch dialogue inference: dataset batching, response selection, and the step loop.

pub mod dataset;
pub mod driver;
pub mod select;

use dialog_backend::{load_pretrained, LoadParams};
use dialog_common::config::InferConfig;
use dialog_common::Result;

use crate::dataset::DialogueDataset;
use crate::driver::{InferReport, InferenceDriver};

/// Resolves the model, loads the test set, and runs inference to `cfg.output_path`.
pub fn run(cfg: &InferConfig) -> Result<InferReport> {
    cfg.validate()?;
    let mut model = load_pretrained(&cfg.model_name_or_path, LoadParams::from(cfg))?;
    let dataset = DialogueDataset::from_file(&cfg.test_data_path, cfg.batch_size, cfg.max_seq_len, model.tokenizer.as_ref())?;
    tracing::info!(target: "infer", "{} test examples from {}", dataset.len(), cfg.test_data_path.display());
    let mut driver = InferenceDriver::new(model.backend.as_mut(), model.tokenizer.as_ref(), cfg);
    driver.run(dataset.batches())
}
