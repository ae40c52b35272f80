use std::path::Path;

use crate::{SpecialTokens, Tokenizer};
use dialog_common::{DialogError, Result};

/// Names of the special tokens as they appear in the vocabulary.
#[derive(Debug, Clone)]
pub struct SpecialTokenNames {
    pub pad: String,
    pub unk: String,
    pub cls: String,
    pub sep: String,
}

/// `tokenizer.json` loaded through the `tokenizers` crate.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    special: SpecialTokens,
    unk_token: String,
}

impl HfTokenizer {
    pub fn from_file(path: &Path, names: &SpecialTokenNames) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| DialogError::ModelNotFound(format!("{}: {e}", path.display())))?;
        let id = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| DialogError::Config(format!("special token `{token}` missing from {}", path.display())))
        };
        let special = SpecialTokens {
            pad: id(&names.pad)?,
            unk: id(&names.unk)?,
            cls: id(&names.cls)?,
            sep: id(&names.sep)?,
        };
        Ok(Self { inner, special, unk_token: names.unk.clone() })
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| DialogError::Backend(format!("tokenize failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|&id| self.inner.id_to_token(id).unwrap_or_else(|| self.unk_token.clone()))
            .collect()
    }

    fn special_tokens(&self) -> SpecialTokens { self.special }
}
