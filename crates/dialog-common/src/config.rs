use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{DialogError, Result};

pub const CONFIG_ENV: &str = "DIALOG_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    GreedySearch,
    Sampling,
    BeamSearch,
}

impl DecodeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeStrategy::GreedySearch => "greedy_search",
            DecodeStrategy::Sampling => "sampling",
            DecodeStrategy::BeamSearch => "beam_search",
        }
    }
}

impl fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecodeStrategy {
    type Err = DialogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy_search" => Ok(DecodeStrategy::GreedySearch),
            "sampling" => Ok(DecodeStrategy::Sampling),
            "beam_search" => Ok(DecodeStrategy::BeamSearch),
            other => Err(DialogError::Config(format!("unknown decode strategy `{other}`"))),
        }
    }
}

/// Execution device, written `cpu`, `gpu`, `gpu:1`, `xpu:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    Gpu(Option<u32>),
    Xpu(Option<u32>),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Gpu(None) => f.write_str("gpu"),
            Device::Gpu(Some(i)) => write!(f, "gpu:{i}"),
            Device::Xpu(None) => f.write_str("xpu"),
            Device::Xpu(Some(i)) => write!(f, "xpu:{i}"),
        }
    }
}

impl FromStr for Device {
    type Err = DialogError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, idx)) => {
                let idx = idx
                    .parse::<u32>()
                    .map_err(|_| DialogError::Config(format!("bad device ordinal in `{s}`")))?;
                (kind, Some(idx))
            }
            None => (s, None),
        };
        match (kind, ordinal) {
            ("cpu", None) => Ok(Device::Cpu),
            ("gpu", idx) => Ok(Device::Gpu(idx)),
            ("xpu", idx) => Ok(Device::Xpu(idx)),
            _ => Err(DialogError::Config(format!("unknown device `{s}`"))),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = DialogError;
    fn try_from(value: String) -> Result<Self> { value.parse() }
}

impl From<Device> for String {
    fn from(value: Device) -> Self { value.to_string() }
}

/// Settings for one batch inference run. Immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    pub device: Device,
    pub seed: u64,
    pub model_name_or_path: String,
    pub test_data_path: PathBuf,
    pub batch_size: usize,
    pub max_dec_len: usize,
    pub min_dec_len: usize,
    pub decode_strategy: DecodeStrategy,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub num_beams: usize,
    pub length_penalty: f32,
    pub early_stopping: bool,
    pub num_samples: usize,
    pub logging_steps: usize,
    pub output_path: PathBuf,
    pub max_seq_len: usize,
    pub metrics_path: Option<PathBuf>,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            device: Device::Gpu(None),
            seed: 2021,
            model_name_or_path: "unified_transformer-12L-cn".into(),
            test_data_path: PathBuf::from("./datasets/test.txt"),
            batch_size: 16,
            max_dec_len: 64,
            min_dec_len: 1,
            decode_strategy: DecodeStrategy::Sampling,
            temperature: 1.0,
            top_k: 5,
            top_p: 1.0,
            num_beams: 1,
            length_penalty: 1.0,
            early_stopping: false,
            num_samples: 20,
            logging_steps: 100,
            output_path: PathBuf::from("./predict.txt"),
            max_seq_len: 512,
            metrics_path: None,
        }
    }
}

impl InferConfig {
    /// Defaults, then the YAML file (`path` or `$DIALOG_CONFIG`), then `DIALOG_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut cfg = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text)
            .map_err(|e| DialogError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DIALOG_MODEL") { self.model_name_or_path = v; }
        if let Some(v) = lookup("DIALOG_TEST_DATA") { self.test_data_path = PathBuf::from(v); }
        if let Some(v) = lookup("DIALOG_OUTPUT_PATH") { self.output_path = PathBuf::from(v); }
        if let Some(v) = lookup("DIALOG_DEVICE") { self.device = v.parse()?; }
        if let Some(v) = lookup("DIALOG_SEED") {
            self.seed = v
                .parse()
                .map_err(|_| DialogError::Config(format!("DIALOG_SEED is not an integer: `{v}`")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(DialogError::Config(msg.to_string()));
        if self.batch_size == 0 { return fail("batch_size must be positive"); }
        if self.logging_steps == 0 { return fail("logging_steps must be positive"); }
        if self.num_samples == 0 { return fail("num_samples must be positive"); }
        if self.max_dec_len == 0 { return fail("max_dec_len must be positive"); }
        if self.min_dec_len > self.max_dec_len { return fail("min_dec_len exceeds max_dec_len"); }
        if self.max_seq_len < 3 { return fail("max_seq_len must leave room for [CLS] and a turn"); }
        if !(self.temperature > 0.0) { return fail("temperature must be positive"); }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) { return fail("top_p must be in (0, 1]"); }
        if self.decode_strategy == DecodeStrategy::BeamSearch && self.num_beams < self.num_samples {
            return fail("beam_search needs num_beams >= num_samples");
        }
        Ok(())
    }

    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device", self.device.to_string()),
            ("seed", self.seed.to_string()),
            ("model_name_or_path", self.model_name_or_path.clone()),
            ("test_data_path", self.test_data_path.display().to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("max_dec_len", self.max_dec_len.to_string()),
            ("min_dec_len", self.min_dec_len.to_string()),
            ("decode_strategy", self.decode_strategy.to_string()),
            ("temperature", self.temperature.to_string()),
            ("top_k", self.top_k.to_string()),
            ("top_p", self.top_p.to_string()),
            ("num_beams", self.num_beams.to_string()),
            ("length_penalty", self.length_penalty.to_string()),
            ("early_stopping", self.early_stopping.to_string()),
            ("num_samples", self.num_samples.to_string()),
            ("logging_steps", self.logging_steps.to_string()),
            ("output_path", self.output_path.display().to_string()),
            ("max_seq_len", self.max_seq_len.to_string()),
        ]
    }

    pub fn log(&self) {
        tracing::info!(target: "config", "-----------  Configuration Arguments -----------");
        for (name, value) in self.describe() {
            tracing::info!(target: "config", "{name}: {value}");
        }
        tracing::info!(target: "config", "------------------------------------------------");
    }
}
