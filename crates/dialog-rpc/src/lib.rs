//! Client for a remote inference pipeline: one feed in, one numeric array out.

pub mod array;
pub mod client;

pub use array::{parse_array, ArrayParseError, NumericArray};
pub use client::{build_feed, Feed, PipelineClient, PipelineConfig, PipelineResponse, Prediction, QueryTitle};

pub type Result<T> = core::result::Result<T, RpcError>;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },
    #[error("response carried no values")]
    EmptyResponse,
    #[error("could not encode example {index}: {source}")]
    Encode { index: usize, source: serde_json::Error },
    #[error("bad array in response: {0}")]
    Parse(#[from] ArrayParseError),
}
