use std::net::SocketAddr;

use axum::{routing::post, Json, Router};
use dialog_backend::http::HttpBackend;
use dialog_backend::mock::{MockBackend, MockTokenizer};
use dialog_backend::{
    load_pretrained, Batch, ExecutionMode, GenerationBackend, GenerationParams, LoadParams, Tokenizer,
};
use dialog_common::config::{DecodeStrategy, InferConfig};
use dialog_common::DialogError;

fn batch_of(rows: &[&[u32]]) -> Batch {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut b = Batch::default();
    for row in rows {
        let mut ids = row.to_vec();
        let mut mask = vec![1.0; row.len()];
        ids.resize(width, 0);
        mask.resize(width, 0.0);
        b.token_ids.push(ids);
        b.type_ids.push(vec![0; width]);
        b.position_ids.push((0..width as u32).collect());
        b.attention_mask.push(mask);
    }
    b
}

fn params(n: usize) -> GenerationParams {
    let cfg = InferConfig { num_samples: n, max_dec_len: 8, ..Default::default() };
    GenerationParams::from(&cfg)
}

fn inference_ready(mut backend: MockBackend) -> MockBackend {
    backend.set_mode(ExecutionMode::Eval);
    backend.set_grad_enabled(false);
    backend
}

#[test]
fn batch_validate_catches_ragged_rows() {
    let mut b = batch_of(&[&[2, 10, 11], &[2, 12]]);
    b.validate().unwrap();
    b.position_ids[1].pop();
    assert!(matches!(b.validate(), Err(DialogError::Shape(_))));
    b.attention_mask.pop();
    assert!(matches!(b.validate(), Err(DialogError::Shape(_))));
}

#[test]
fn mock_refuses_training_mode() {
    let mut backend = MockBackend::new(LoadParams::default());
    let err = backend.generate(&batch_of(&[&[2, 10]]), &params(1)).unwrap_err();
    assert!(matches!(err, DialogError::Backend(_)));
}

#[test]
fn mock_returns_num_return_sequences_per_row() {
    let mut backend = inference_ready(MockBackend::new(LoadParams { seed: 5, ..Default::default() }));
    let out = backend.generate(&batch_of(&[&[2, 10, 11, 3, 2], &[2, 12, 3, 2]]), &params(3)).unwrap();
    assert_eq!(out.ids.len(), 6);
    assert_eq!(out.scores.len(), 6);
    assert!(out.ids.iter().all(|ids| !ids.is_empty() && ids.len() <= 9));
}

#[test]
fn mock_is_deterministic_for_a_seed() {
    let batch = batch_of(&[&[2, 10, 11, 12, 3, 2]]);
    let run = || {
        let mut backend = inference_ready(MockBackend::new(LoadParams { seed: 11, ..Default::default() }));
        backend.generate(&batch, &params(4)).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn greedy_mock_cycles_context_chars() {
    let mut backend = inference_ready(MockBackend::new(LoadParams::default()));
    let mut p = params(1);
    p.decode_strategy = DecodeStrategy::GreedySearch;
    let out = backend.generate(&batch_of(&[&[2, 10, 11, 3, 2]]), &p).unwrap();
    assert_eq!(out.ids[0], vec![10, 11, 3]);
}

#[test]
fn mock_tokenizer_is_char_level() {
    let tok = MockTokenizer::new();
    let ids = tok.encode("你 好").unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(tok.convert_ids_to_tokens(&ids), vec!["你".to_string(), "好".to_string()]);
    assert_eq!(tok.convert_ids_to_tokens(&[tok.special_tokens().sep]), vec!["[SEP]".to_string()]);
}

#[test]
fn default_merge_subword_joins_sentencepiece_pieces() {
    struct Pieces;
    impl Tokenizer for Pieces {
        fn encode(&self, _: &str) -> dialog_common::Result<Vec<u32>> { Ok(vec![]) }
        fn convert_ids_to_tokens(&self, _: &[u32]) -> Vec<String> { vec![] }
        fn special_tokens(&self) -> dialog_backend::SpecialTokens {
            dialog_backend::SpecialTokens { pad: 0, unk: 1, cls: 2, sep: 3 }
        }
    }
    let tokens = ["\u{2581}he", "llo", "\u{2581}", "\u{2581}world"].map(String::from).to_vec();
    assert_eq!(Pieces.merge_subword(tokens), vec!["hello".to_string(), "world".to_string()]);
}

#[test]
fn unknown_model_is_not_found() {
    let err = load_pretrained("no-such-model-anywhere", LoadParams::default()).err().unwrap();
    assert!(matches!(err, DialogError::ModelNotFound(_)));
}

#[test]
fn mock_model_resolves() {
    let model = load_pretrained("mock", LoadParams::default()).unwrap();
    assert_eq!(model.tokenizer.special_tokens().cls, 2);
}

const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {"type": "WhitespaceSplit"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {"[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3, "hello": 4, "world": 5},
    "unk_token": "[UNK]"
  }
}"#;

#[test]
fn model_dir_loads_manifest_and_tokenizer() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("model.yaml"), "endpoint: http://127.0.0.1:9/\n").unwrap();
    std::fs::write(dir.path().join("tokenizer.json"), TOKENIZER_JSON).unwrap();
    let model = load_pretrained(dir.path().to_str().unwrap(), LoadParams::default()).unwrap();
    assert_eq!(model.tokenizer.encode("hello world").unwrap(), vec![4, 5]);
    assert_eq!(model.tokenizer.special_tokens().sep, 3);
}

fn spawn_service(router: Router) -> SocketAddr {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

#[test]
fn http_backend_posts_batch_and_reads_candidates() {
    let router = Router::new().route(
        "/generate",
        post(|Json(body): Json<serde_json::Value>| async move {
            let rows = body["input_ids"].as_array().map_or(0, Vec::len);
            let n = body["num_return_sequences"].as_u64().unwrap_or(1) as usize;
            let ids: Vec<Vec<u32>> = (0..rows * n).map(|i| vec![4 + i as u32, 3]).collect();
            let scores: Vec<f32> = (0..rows * n).map(|i| -(i as f32)).collect();
            Json(serde_json::json!({ "ids": ids, "scores": scores }))
        }),
    );
    let addr = spawn_service(router);
    let mut backend = HttpBackend::new(&format!("http://{addr}/"), LoadParams::default()).unwrap();
    backend.set_mode(ExecutionMode::Eval);
    backend.set_grad_enabled(false);
    let out = backend.generate(&batch_of(&[&[2, 4, 3, 2], &[2, 5, 3, 2]]), &params(2)).unwrap();
    assert_eq!(out.ids.len(), 4);
    assert_eq!(out.ids[3], vec![7, 3]);
    assert_eq!(out.scores[1], -1.0);
}

#[test]
fn http_backend_rejects_short_reply() {
    let router = Router::new().route(
        "/generate",
        post(|| async { Json(serde_json::json!({ "ids": [[4, 3]], "scores": [0.0] })) }),
    );
    let addr = spawn_service(router);
    let mut backend = HttpBackend::new(&format!("http://{addr}"), LoadParams::default()).unwrap();
    backend.set_mode(ExecutionMode::Eval);
    backend.set_grad_enabled(false);
    let err = backend.generate(&batch_of(&[&[2, 4], &[2, 5]]), &params(1)).unwrap_err();
    assert!(matches!(err, DialogError::Shape(_)));
}
