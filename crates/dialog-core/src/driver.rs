use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dialog_backend::{Batch, ExecutionMode, GenerationBackend, GenerationParams, Tokenizer};
use dialog_common::config::InferConfig;
use dialog_common::{DialogError, Result};

use crate::select::select_response;

#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    pub step: usize,
    pub secs_per_step: f64,
}

/// Averages step time over windows of `logging_steps` steps.
#[derive(Debug)]
pub struct ThroughputMeter {
    logging_steps: usize,
    total: Duration,
}

impl ThroughputMeter {
    pub fn new(logging_steps: usize) -> Self {
        Self { logging_steps: logging_steps.max(1), total: Duration::ZERO }
    }

    pub fn record(&mut self, step: usize, elapsed: Duration) -> Option<ThroughputReport> {
        self.total += elapsed;
        if step % self.logging_steps != 0 {
            return None;
        }
        let report = ThroughputReport {
            step,
            secs_per_step: self.total.as_secs_f64() / self.logging_steps as f64,
        };
        self.total = Duration::ZERO;
        Some(report)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferReport {
    pub steps: usize,
    pub responses: usize,
    pub throughput: Vec<ThroughputReport>,
    pub output_path: PathBuf,
}

pub struct InferenceDriver<'a> {
    backend: &'a mut dyn GenerationBackend,
    tokenizer: &'a dyn Tokenizer,
    params: GenerationParams,
    logging_steps: usize,
    output_path: PathBuf,
}

impl<'a> InferenceDriver<'a> {
    pub fn new(backend: &'a mut dyn GenerationBackend, tokenizer: &'a dyn Tokenizer, cfg: &InferConfig) -> Self {
        Self {
            backend,
            tokenizer,
            params: GenerationParams::from(cfg),
            logging_steps: cfg.logging_steps,
            output_path: cfg.output_path.clone(),
        }
    }

    /// Generates for every batch and writes one response per input line.
    pub fn run<I>(&mut self, batches: I) -> Result<InferReport>
    where
        I: IntoIterator<Item = Batch>,
    {
        let (responses, throughput) = self.infer(batches)?;
        write_responses(&self.output_path, &responses)?;
        tracing::info!(target: "infer", "save inference result into: {}", self.output_path.display());
        Ok(InferReport {
            steps: throughput.steps,
            responses: responses.len(),
            throughput: throughput.reports,
            output_path: self.output_path.clone(),
        })
    }

    /// Responses in global input order, plus the throughput reports emitted on the way.
    pub fn infer<I>(&mut self, batches: I) -> Result<(Vec<String>, StepLog)>
    where
        I: IntoIterator<Item = Batch>,
    {
        tracing::info!(target: "infer", "infer begin...");
        self.backend.set_mode(ExecutionMode::Eval);
        self.backend.set_grad_enabled(false);

        let mut meter = ThroughputMeter::new(self.logging_steps);
        let mut log = StepLog::default();
        let mut responses = Vec::new();
        let mut start = Instant::now();
        for (idx, batch) in batches.into_iter().enumerate() {
            let step = idx + 1;
            batch.validate()?;
            let output = self.backend.generate(&batch, &self.params)?;
            let elapsed = start.elapsed();
            if let Some(report) = meter.record(step, elapsed) {
                tracing::info!(target: "infer", "step {} - {:.3}s/step", report.step, report.secs_per_step);
                log.reports.push(report);
            }
            let results = select_response(
                &output,
                self.tokenizer,
                Some(self.params.max_length),
                self.params.num_return_sequences,
            )?;
            if results.len() != batch.rows() {
                return Err(DialogError::Shape(format!(
                    "step {step}: {} responses for {} inputs",
                    results.len(),
                    batch.rows()
                )));
            }
            dialog_obs::record_step(elapsed.as_secs_f64(), results.len());
            responses.extend(results);
            log.steps = step;
            start = Instant::now();
        }
        Ok((responses, log))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepLog {
    pub steps: usize,
    pub reports: Vec<ThroughputReport>,
}

/// One response per line, UTF-8, replacing any existing file.
pub fn write_responses(path: &Path, responses: &[String]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for response in responses {
        writeln!(out, "{response}")?;
    }
    out.flush()?;
    Ok(())
}
