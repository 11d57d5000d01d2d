//! Model file resolution.
//!
//! A model id is either a local directory holding `config.json`,
//! `tokenizer.json` and `*.safetensors`, or a Hugging Face hub repository
//! (e.g. `gpt2`, `openai-community/gpt2-medium`) fetched into the hub cache.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};

use crate::{ModelError, Result};

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Paths of everything needed to build a model and its tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// One or more safetensors shards, sorted.
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// Resolve a local directory first, otherwise download from the hub.
    pub fn resolve(model_id: &str, revision: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            tracing::debug!(path = %local.display(), "using local model directory");
            Self::from_dir(local)
        } else {
            Self::from_hub(model_id, revision)
        }
    }

    /// Collect files from a model directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let config = required_file(dir, CONFIG_FILE)?;
        let tokenizer = required_file(dir, TOKENIZER_FILE)?;
        let weights = discover_weight_files(dir)?;
        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    /// Fetch files from the Hugging Face hub, reusing the local cache.
    pub fn from_hub(model_id: &str, revision: &str) -> Result<Self> {
        let api = ApiBuilder::new()
            .with_progress(true)
            .build()
            .map_err(|e| ModelError::Hub(e.to_string()))?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let fetch = |file: &str| {
            repo.get(file)
                .map_err(|e| ModelError::Hub(format!("{model_id}@{revision}/{file}: {e}")))
        };

        tracing::info!(model_id, revision, "fetching model files");
        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: vec![fetch(WEIGHTS_FILE)?],
        })
    }
}

fn required_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelError::WeightLoad(format!(
            "{name} not found in {}",
            dir.display()
        )))
    }
}

/// Discover all safetensors files in a model directory.
///
/// Handles both single-file models and sharded models
/// (e.g., model-00001-of-00002.safetensors).
pub fn discover_weight_files(model_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();

    if files.is_empty() {
        return Err(ModelError::WeightLoad(format!(
            "no .safetensors files found in {}",
            model_dir.display()
        )));
    }

    files.sort();
    Ok(files)
}
