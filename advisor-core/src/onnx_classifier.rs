//! ONNX category model: local inference for the category router
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for tokenization.
//! The exported model takes `input_ids` + `attention_mask` and emits one
//! logit per label, in `Category::ALL` order.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;

use crate::classifier::{CategoryModel, ClassifierError};
use crate::models::{Category, CategoryPrediction};

/// Local ONNX sequence classifier over the fixed label set.
pub struct OnnxCategoryModel {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
}

impl std::fmt::Debug for OnnxCategoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxCategoryModel").finish_non_exhaustive()
    }
}

impl OnnxCategoryModel {
    /// Load the ONNX model and its tokenizer.
    ///
    /// Returns `ClassifierError::ModelNotFound` if either file is missing.
    pub fn new(model_path: PathBuf, tokenizer_path: PathBuf) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::ModelNotFound {
                path: tokenizer_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ClassifierError::Tokenizer(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl CategoryModel for OnnxCategoryModel {
    async fn predict(&self, text: &str) -> Result<CategoryPrediction, ClassifierError> {
        // ONNX inference is CPU-bound, so it runs on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| ClassifierError::Inference(format!("session lock poisoned: {e}")))?;
            predict_sync(&mut session_guard, &tokenizer, &text)
        })
        .await
        .map_err(|e| ClassifierError::Inference(format!("spawn_blocking join error: {e}")))?
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn predict_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    text: &str,
) -> Result<CategoryPrediction, ClassifierError> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| ClassifierError::Tokenizer(e.to_string()))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let shape = vec![1i64, input_ids.len() as i64];

    let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    let inputs = ort::inputs! {
        "input_ids" => input_ids_tensor,
        "attention_mask" => attention_mask_tensor,
    };

    let outputs = session
        .run(inputs)
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    // Expected shape: [1, num_labels]
    let (out_shape, logits) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    let width = out_shape.last().copied().unwrap_or(0) as usize;
    if width != Category::ALL.len() || logits.len() < width {
        return Err(ClassifierError::Inference(format!(
            "expected {} logits, got shape {:?}",
            Category::ALL.len(),
            &out_shape[..]
        )));
    }

    let probabilities = softmax(&logits[..width]);
    let scores: BTreeMap<Category, f32> = Category::ALL.into_iter().zip(probabilities).collect();

    CategoryPrediction::from_scores(scores)
        .ok_or_else(|| ClassifierError::Inference("empty score map".to_string()))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("advisor/models")
}

/// Resolve paths for the ONNX model and tokenizer.
///
/// If `model_path` from config is empty, uses the default location.
pub fn resolve_model_paths(model_path: &str) -> (PathBuf, PathBuf) {
    if model_path.is_empty() {
        let dir = default_model_dir();
        (
            dir.join("business-classifier.onnx"),
            dir.join("business-classifier-tokenizer.json"),
        )
    } else {
        let model = crate::config::expand_path(model_path);
        let stem = model
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
        (model, tokenizer)
    }
}

/// Load the configured model, or `None` when it is unavailable.
pub fn load_category_model(model_path: &str) -> Option<Arc<dyn CategoryModel>> {
    let (model, tokenizer) = resolve_model_paths(model_path);
    match OnnxCategoryModel::new(model, tokenizer) {
        Ok(m) => {
            tracing::info!("Category classifier loaded");
            Some(Arc::new(m))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Category classifier not loaded, keyword heuristic in use");
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_returns_error() {
        let result = OnnxCategoryModel::new(
            PathBuf::from("/nonexistent/model.onnx"),
            PathBuf::from("/nonexistent/tokenizer.json"),
        );
        assert!(result.is_err());
        match result.unwrap_err() {
            ClassifierError::ModelNotFound { path } => {
                assert!(path.contains("nonexistent"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_model_is_none() {
        assert!(load_category_model("/nonexistent/business-classifier.onnx").is_none());
    }

    #[test]
    fn test_default_model_dir_contains_advisor() {
        let dir = default_model_dir();
        assert!(
            dir.to_string_lossy().contains("advisor/models"),
            "Expected advisor/models in path, got: {}",
            dir.display()
        );
    }

    #[test]
    fn test_resolve_model_paths_default() {
        let (model, tokenizer) = resolve_model_paths("");
        assert!(model.to_string_lossy().ends_with("business-classifier.onnx"));
        assert!(tokenizer
            .to_string_lossy()
            .ends_with("business-classifier-tokenizer.json"));
    }

    #[test]
    fn test_resolve_model_paths_custom() {
        let (model, tokenizer) = resolve_model_paths("/opt/models/custom.onnx");
        assert_eq!(model, PathBuf::from("/opt/models/custom.onnx"));
        assert_eq!(tokenizer, PathBuf::from("/opt/models/custom-tokenizer.json"));
    }

    #[test]
    fn test_softmax_is_distribution() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(p[2] > p[1] && p[1] > p[0]);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
