//! Tests for GPT-2 model configuration.

use gpt2_models::{Gpt2Config, ModelError};

#[test]
fn test_gpt2_small_preset() {
    let config = Gpt2Config::gpt2_small();
    assert_eq!(config.vocab_size, 50257);
    assert_eq!(config.n_positions, 1024);
    assert_eq!(config.n_embd, 768);
    assert_eq!(config.n_layer, 12);
    assert_eq!(config.n_head, 12);
    assert_eq!(config.head_dim(), 64);
    assert_eq!(config.inner_dim(), 3072);
    assert_eq!(config.eos_token_id, 50256);
    assert!(config.validate().is_ok());
}

#[test]
fn test_gpt2_medium_preset() {
    let config = Gpt2Config::gpt2_medium();
    assert_eq!(config.n_embd, 1024);
    assert_eq!(config.n_layer, 24);
    assert_eq!(config.n_head, 16);
    assert_eq!(config.head_dim(), 64);
}

#[test]
fn test_estimated_params_small() {
    let params = Gpt2Config::gpt2_small().estimated_params();
    // 124M with tied embeddings.
    assert!((120_000_000..130_000_000).contains(&params), "got {params}");
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "activation_function": "gelu_new",
        "architectures": ["GPT2LMHeadModel"],
        "bos_token_id": 50256,
        "eos_token_id": 50256,
        "layer_norm_epsilon": 1e-05,
        "model_type": "gpt2",
        "n_ctx": 1024,
        "n_embd": 768,
        "n_head": 12,
        "n_inner": null,
        "n_layer": 12,
        "n_positions": 1024,
        "vocab_size": 50257
    }"#;
    let config: Gpt2Config = serde_json::from_str(json).unwrap();
    assert_eq!(config, Gpt2Config::gpt2_small());
}

#[test]
fn test_config_defaults_fill_missing_fields() {
    let config: Gpt2Config = serde_json::from_str(r#"{"n_layer": 6}"#).unwrap();
    assert_eq!(config.n_layer, 6);
    assert_eq!(config.n_embd, 768);
    assert_eq!(config.model_type, "gpt2");
}

#[test]
fn test_config_rejects_indivisible_heads() {
    let config = Gpt2Config {
        n_embd: 100,
        n_head: 3,
        ..Gpt2Config::gpt2_small()
    };
    assert!(matches!(config.validate(), Err(ModelError::Config(_))));
}

#[test]
fn test_config_rejects_other_model_types() {
    let config = Gpt2Config {
        model_type: "llama".to_string(),
        ..Gpt2Config::gpt2_small()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("llama"));
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"n_embd": 64, "n_head": 4, "n_layer": 2}"#).unwrap();

    let config = Gpt2Config::from_file(&path).unwrap();
    assert_eq!(config.head_dim(), 16);
}

#[test]
fn test_config_from_file_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(
        Gpt2Config::from_file(&path),
        Err(ModelError::Json(_))
    ));
}
