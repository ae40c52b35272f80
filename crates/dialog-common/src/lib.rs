pub mod config;

pub type Result<T> = core::result::Result<T, DialogError>;

#[derive(thiserror::Error, Debug)]
pub enum DialogError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("bad example at line {line}: {message}")]
    Data { line: usize, message: String },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("transport error: {0}")]
    Transport(String),
}
