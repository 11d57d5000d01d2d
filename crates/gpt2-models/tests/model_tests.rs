//! Forward-pass tests on a tiny randomly initialised GPT-2.
//!
//! Validates:
//! - Logit shapes for batched prompt and decode steps
//! - Cache offsets advance with each step
//! - Incremental (cached) decoding matches a full recompute
//! - Context window and vocabulary bounds are enforced

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use gpt2_engine::{CausalLm, EngineError};
use gpt2_models::{Gpt2Config, Gpt2Model};

fn tiny_config() -> Gpt2Config {
    Gpt2Config {
        vocab_size: 32,
        n_positions: 16,
        n_embd: 16,
        n_layer: 2,
        n_head: 4,
        n_inner: None,
        layer_norm_epsilon: 1e-5,
        eos_token_id: 31,
        model_type: "gpt2".to_string(),
    }
}

fn tiny_model() -> (Gpt2Model, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = Gpt2Model::new(&tiny_config(), vb).unwrap();
    (model, varmap)
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

#[test]
fn prompt_step_returns_one_row_per_sequence() {
    let (model, _vars) = tiny_model();
    let mut cache = model.new_cache();

    let logits = model
        .forward(&[vec![1, 2, 3], vec![1, 2, 3]], &mut cache)
        .unwrap();
    assert_eq!(logits.len(), 2);
    assert!(logits.iter().all(|row| row.len() == 32));
    assert!(logits.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(cache.offset(), 3);
}

#[test]
fn identical_rows_give_identical_logits() {
    let (model, _vars) = tiny_model();
    let mut cache = model.new_cache();
    let logits = model.forward(&[vec![4, 5], vec![4, 5]], &mut cache).unwrap();
    assert!(max_abs_diff(&logits[0], &logits[1]) < 1e-6);
}

#[test]
fn cached_decode_matches_full_recompute() {
    let (model, _vars) = tiny_model();

    let mut full_cache = model.new_cache();
    let full = model.forward(&[vec![7, 3, 9, 1]], &mut full_cache).unwrap();

    let mut cache = model.new_cache();
    model.forward(&[vec![7, 3]], &mut cache).unwrap();
    model.forward(&[vec![9]], &mut cache).unwrap();
    let incremental = model.forward(&[vec![1]], &mut cache).unwrap();

    assert_eq!(cache.offset(), 4);
    let diff = max_abs_diff(&full[0], &incremental[0]);
    assert!(diff < 1e-4, "cached and full logits differ by {diff}");
}

#[test]
fn context_window_is_enforced() {
    let (model, _vars) = tiny_model();
    let mut cache = model.new_cache();

    model.forward(&[vec![0; 15]], &mut cache).unwrap();
    model.forward(&[vec![0]], &mut cache).unwrap();
    let err = model.forward(&[vec![0]], &mut cache).unwrap_err();
    assert!(matches!(err, EngineError::Inference(_)));
    assert!(err.to_string().contains("context window"));
}

#[test]
fn out_of_vocabulary_token_is_rejected() {
    let (model, _vars) = tiny_model();
    let mut cache = model.new_cache();
    let err = model.forward(&[vec![32]], &mut cache).unwrap_err();
    assert!(err.to_string().contains("outside vocabulary"));
    assert_eq!(cache.offset(), 0);
}

#[test]
fn zero_weights_load_under_bare_names() {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = Gpt2Model::new(&tiny_config(), vb).unwrap();
    assert_eq!(model.vocab_size(), 32);
    assert_eq!(model.context_size(), 16);

    let mut cache = model.new_cache();
    let logits = model.forward(&[vec![1]], &mut cache).unwrap();
    assert!(logits[0].iter().all(|&v| v == 0.0));
}
