//! Resolves a model name or directory to a backend and tokenizer pair.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::hf::{HfTokenizer, SpecialTokenNames};
use crate::http::HttpBackend;
use crate::{GenerationBackend, LoadParams, Tokenizer};
use dialog_common::{DialogError, Result};

pub const MODEL_HOME_ENV: &str = "DIALOG_MODEL_HOME";
pub const MANIFEST_FILE: &str = "model.yaml";

/// `model.yaml` inside a model directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub endpoint: String,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: PathBuf,
    #[serde(default = "default_pad")]
    pub pad_token: String,
    #[serde(default = "default_unk")]
    pub unk_token: String,
    #[serde(default = "default_cls")]
    pub cls_token: String,
    #[serde(default = "default_sep")]
    pub sep_token: String,
}

fn default_tokenizer() -> PathBuf { PathBuf::from("tokenizer.json") }
fn default_pad() -> String { "[PAD]".into() }
fn default_unk() -> String { "[UNK]".into() }
fn default_cls() -> String { "[CLS]".into() }
fn default_sep() -> String { "[SEP]".into() }

impl ModelManifest {
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(|e| DialogError::Config(format!("{}: {e}", path.display())))
    }

    fn special_names(&self) -> SpecialTokenNames {
        SpecialTokenNames {
            pad: self.pad_token.clone(),
            unk: self.unk_token.clone(),
            cls: self.cls_token.clone(),
            sep: self.sep_token.clone(),
        }
    }
}

pub struct LoadedModel {
    pub backend: Box<dyn GenerationBackend>,
    pub tokenizer: Box<dyn Tokenizer>,
}

pub fn model_home() -> PathBuf {
    env::var(MODEL_HOME_ENV).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("models"))
}

/// Looks for `mock`, then a directory holding `model.yaml`, then `<model home>/<name>`.
pub fn load_pretrained(name_or_path: &str, params: LoadParams) -> Result<LoadedModel> {
    #[cfg(feature = "mock")]
    if name_or_path == "mock" {
        tracing::info!(target: "hub", "using built-in mock model");
        return Ok(LoadedModel {
            backend: Box::new(crate::mock::MockBackend::new(params)),
            tokenizer: Box::new(crate::mock::MockTokenizer::new()),
        });
    }
    let direct = PathBuf::from(name_or_path);
    let dir = if direct.join(MANIFEST_FILE).is_file() {
        direct
    } else {
        let cached = model_home().join(name_or_path);
        if !cached.join(MANIFEST_FILE).is_file() {
            return Err(DialogError::ModelNotFound(name_or_path.to_string()));
        }
        cached
    };
    load_dir(&dir, params)
}

fn load_dir(dir: &Path, params: LoadParams) -> Result<LoadedModel> {
    let manifest = ModelManifest::from_dir(dir)?;
    let tokenizer = HfTokenizer::from_file(&dir.join(&manifest.tokenizer), &manifest.special_names())?;
    let backend = HttpBackend::new(&manifest.endpoint, params)?;
    tracing::info!(target: "hub", "model {} served at {} on {}", dir.display(), backend.url(), params.device);
    Ok(LoadedModel { backend: Box::new(backend), tokenizer: Box::new(tokenizer) })
}
