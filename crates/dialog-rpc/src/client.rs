use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::array::{parse_array, NumericArray};
use crate::{Result, RpcError};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub server: String,
    pub service: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { server: "127.0.0.1:8089".into(), service: "ernie".into() }
    }
}

impl PipelineConfig {
    pub fn new() -> Self { Self::default() }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn prediction_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            format!("{server}/{}/prediction", self.service)
        } else {
            format!("http://{server}/{}/prediction", self.service)
        }
    }
}

/// Query/title pair, the record shape the matching pipeline expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTitle {
    pub query: String,
    pub title: String,
}

impl Default for QueryTitle {
    fn default() -> Self {
        Self {
            query: "中西方语言与文化的差异".into(),
            title: "第二语言习得的一大障碍就是文化差异。".into(),
        }
    }
}

/// Ordered `"0".."n-1"` keys mapped to the serialized example records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Feed {
    key: Vec<String>,
    value: Vec<String>,
}

impl Feed {
    pub fn len(&self) -> usize { self.key.len() }

    pub fn is_empty(&self) -> bool { self.key.is_empty() }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.key.iter().map(String::as_str).zip(self.value.iter().map(String::as_str))
    }
}

pub fn build_feed<T: Serialize>(examples: &[T]) -> Result<Feed> {
    let mut feed = Feed::default();
    for (index, example) in examples.iter().enumerate() {
        let value = serde_json::to_string(example).map_err(|source| RpcError::Encode { index, source })?;
        feed.key.push(index.to_string());
        feed.value.push(value);
    }
    Ok(feed)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineResponse {
    pub err_no: i64,
    pub err_msg: String,
    pub key: Vec<String>,
    pub value: Vec<String>,
}

impl PipelineResponse {
    /// Decodes `value[0]` with the strict array parser.
    pub fn first_array(&self) -> Result<NumericArray> {
        let first = self.value.first().ok_or(RpcError::EmptyResponse)?;
        Ok(parse_array(first)?)
    }
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub response: PipelineResponse,
    pub elapsed: Duration,
}

/// Single-endpoint client. No pooling across servers, no retries.
pub struct PipelineClient {
    http: reqwest::Client,
    url: String,
}

impl PipelineClient {
    pub fn connect(config: &PipelineConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let url = config.prediction_url();
        tracing::debug!(target: "rpc", "pipeline endpoint {}", url);
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &str { &self.url }

    pub async fn predict(&self, feed: &Feed) -> Result<Prediction> {
        let start = Instant::now();
        let response: PipelineResponse = self
            .http
            .post(&self.url)
            .json(feed)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let elapsed = start.elapsed();
        dialog_obs::record_rpc(elapsed.as_secs_f64());
        tracing::debug!(target: "rpc", "time to cost :{} seconds", elapsed.as_secs_f64());
        if response.err_no != 0 {
            return Err(RpcError::Server { code: response.err_no, message: response.err_msg });
        }
        Ok(Prediction { response, elapsed })
    }
}
