use dialog_backend::mock::MockTokenizer;
use dialog_backend::{GenerationOutput, Tokenizer};
use dialog_common::DialogError;
use dialog_core::dataset::{encode_dialogue, parse_pretokenized, DialogueDataset};
use dialog_core::select::{has_in_turn_repetition, post_process_response, select_response};

fn ids(text: &str) -> Vec<u32> {
    let tok = MockTokenizer::new();
    let mut ids = tok.encode(text).unwrap();
    ids.push(tok.special_tokens().sep);
    ids
}

#[test]
fn post_process_cuts_at_first_sep() {
    let tok = MockTokenizer::new();
    let mut pred = ids("好的");
    pred.extend(ids("多余"));
    let (kept, tokens) = post_process_response(&pred, &tok);
    assert_eq!(kept.len(), 2);
    assert_eq!(tokens, vec!["好", "的"]);
}

#[test]
fn repetition_detects_repeated_trigram() {
    assert!(has_in_turn_repetition(&['a', 'b', 'c', 'x', 'a', 'b', 'c']));
    assert!(!has_in_turn_repetition(&['a', 'b', 'c', 'a', 'b']));
    assert!(!has_in_turn_repetition(&['a', 'b']));
    assert!(has_in_turn_repetition::<u32>(&[]));
}

#[test]
fn empty_response_never_beats_a_real_one() {
    let tok = MockTokenizer::new();
    let output = GenerationOutput {
        ids: vec![vec![tok.special_tokens().sep], ids("你好")],
        scores: vec![-0.1, -0.5],
    };
    assert_eq!(select_response(&output, &tok, Some(64), 2).unwrap(), vec!["你 好"]);
}

#[test]
fn case_variant_repeats_are_penalized() {
    let tok = MockTokenizer::new();
    let output = GenerationOutput { ids: vec![ids("Abcabc"), ids("你好")], scores: vec![-0.1, -0.5] };
    assert_eq!(select_response(&output, &tok, Some(64), 2).unwrap(), vec!["你 好"]);
}

#[test]
fn highest_score_wins_per_group() {
    let tok = MockTokenizer::new();
    let output = GenerationOutput {
        ids: vec![ids("甲"), ids("乙"), ids("丙"), ids("丁")],
        scores: vec![-2.0, -1.0, -0.5, -3.0],
    };
    let picked = select_response(&output, &tok, Some(10), 2).unwrap();
    assert_eq!(picked, vec!["乙", "丙"]);
}

#[test]
fn unfinished_and_repetitive_candidates_lose() {
    let tok = MockTokenizer::new();
    let unfinished = MockTokenizer::new().encode("一二三四五").unwrap();
    let output = GenerationOutput {
        ids: vec![unfinished, ids("哈哈哈哈"), ids("你好")],
        scores: vec![5.0, 4.0, -2.0],
    };
    let picked = select_response(&output, &tok, Some(5), 3).unwrap();
    assert_eq!(picked, vec!["你 好"]);
}

#[test]
fn ties_keep_the_earliest_candidate() {
    let tok = MockTokenizer::new();
    let output = GenerationOutput { ids: vec![ids("早"), ids("晚")], scores: vec![-1.0, -1.0] };
    assert_eq!(select_response(&output, &tok, None, 2).unwrap(), vec!["早"]);
}

#[test]
fn ungroupable_candidates_are_rejected() {
    let tok = MockTokenizer::new();
    let output = GenerationOutput { ids: vec![ids("a"), ids("b"), ids("c")], scores: vec![0.0; 3] };
    assert!(matches!(select_response(&output, &tok, None, 2), Err(DialogError::Shape(_))));
    let output = GenerationOutput { ids: vec![ids("a")], scores: vec![] };
    assert!(matches!(select_response(&output, &tok, None, 1), Err(DialogError::Shape(_))));
}

#[test]
fn encode_wraps_turns_and_marks_response_start() {
    let tok = MockTokenizer::new();
    let sp = tok.special_tokens();
    let ex = encode_dialogue(&["ab", "c"], &tok, 512).unwrap();
    let a = tok.encode("a").unwrap()[0];
    assert_eq!(ex.token_ids, vec![sp.cls, a, a + 1, sp.sep, a + 2, sp.sep, sp.cls]);
    assert_eq!(ex.type_ids, vec![0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(ex.position_ids, (0..7).collect::<Vec<u32>>());
}

#[test]
fn encode_truncates_oldest_context() {
    let tok = MockTokenizer::new();
    let ex = encode_dialogue(&["abcdef", "xy"], &tok, 6).unwrap();
    assert_eq!(ex.len(), 6);
    let tokens = tok.convert_ids_to_tokens(&ex.token_ids);
    assert_eq!(tokens, vec!["[CLS]", "[SEP]", "x", "y", "[SEP]", "[CLS]"]);
}

#[test]
fn batches_pad_to_longest_and_keep_order() {
    let tok = MockTokenizer::new();
    let data = DialogueDataset::from_reader("abc\n\nd\nef\n".as_bytes(), 2, 512, &tok).unwrap();
    assert_eq!(data.len(), 3);
    let batches: Vec<_> = data.batches().collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].rows(), 2);
    assert_eq!(batches[0].seq_len(), 6);
    assert_eq!(batches[0].token_ids[1][4..], [tok.special_tokens().pad; 2]);
    assert_eq!(batches[0].attention_mask[1], vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(batches[1].rows(), 1);
    batches.iter().for_each(|b| b.validate().unwrap());
}

#[test]
fn zero_batch_size_is_rejected() {
    let tok = MockTokenizer::new();
    assert!(DialogueDataset::from_reader("a\n".as_bytes(), 0, 512, &tok).is_err());
}

#[test]
fn pretokenized_lines_are_taken_as_is() {
    let text = "1 10 11 2 1;0 0 0 0 1;0 1 2 3 4\n\n7 8;0 1;0 1;extra\n";
    let data = DialogueDataset::from_reader(text.as_bytes(), 4, 512, &MockTokenizer::new()).unwrap();
    assert_eq!(data.len(), 2);
    let batch = data.batches().next().unwrap();
    assert_eq!(batch.token_ids[0], vec![1, 10, 11, 2, 1]);
    assert_eq!(batch.type_ids[0], vec![0, 0, 0, 0, 1]);
    assert_eq!(batch.token_ids[1], vec![7, 8, 0, 0, 0]);
    assert_eq!(batch.position_ids[1], vec![0, 1, 0, 0, 0]);
}

#[test]
fn pretokenized_columns_must_agree() {
    let err = DialogueDataset::from_reader("1 2 3;0 0;0 1 2\n".as_bytes(), 1, 512, &MockTokenizer::new()).err().unwrap();
    assert!(matches!(err, DialogError::Data { line: 1, .. }));
    assert!(parse_pretokenized("你好\t1;2;3").is_none());
    assert!(parse_pretokenized("1 2;3 4").is_none());
}
