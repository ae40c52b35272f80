//! Process-wide Prometheus metrics for inference runs and pipeline calls

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, IntCounter, TextEncoder};

static STEPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| prometheus::register_int_counter!("dialog_infer_steps_total", "Batches run through generation").unwrap());
static RESPONSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| prometheus::register_int_counter!("dialog_infer_responses_total", "Responses selected").unwrap());
static STEP_SECONDS: Lazy<Histogram> = Lazy::new(|| prometheus::register_histogram!("dialog_infer_step_seconds", "Wall time per batch (fetch + generate)").unwrap());
static RPC_LATENCY: Lazy<Histogram> = Lazy::new(|| prometheus::register_histogram!("dialog_rpc_latency_seconds", "Pipeline predict round trip").unwrap());

pub fn init() {
    let _ = &*STEPS_TOTAL;
    let _ = &*RESPONSES_TOTAL;
    let _ = &*STEP_SECONDS;
    let _ = &*RPC_LATENCY;
}

pub fn record_step(seconds: f64, responses: usize) {
    STEPS_TOTAL.inc();
    RESPONSES_TOTAL.inc_by(responses as u64);
    STEP_SECONDS.observe(seconds);
}

pub fn record_rpc(seconds: f64) { RPC_LATENCY.observe(seconds); }

pub fn steps_total() -> u64 { STEPS_TOTAL.get() }

/// Text exposition of everything in the default registry.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
