//! Router evaluation against a golden dataset
//!
//! The dataset is a JSON array of `{id, query, intent, notes}` objects. Each
//! query is classified once and the predicted intent compared with the label.

use crate::graph::state::Intent;
use crate::routing::Classifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// One labelled example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenExample {
    pub id: String,
    pub query: String,
    pub intent: Intent,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Classifier outcome for one example
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalResult {
    pub id: String,
    pub query: String,
    pub expected_intent: Intent,
    pub predicted_intent: Option<Intent>,
    pub confidence: Option<f64>,
    pub correct: bool,
    pub error: Option<String>,
}

/// Accuracy for one intent label
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntentAccuracy {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Failed to read dataset: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Dataset is empty")]
    Empty,
}

/// Load and parse a golden dataset file
pub fn load_golden_dataset(path: &Path) -> Result<Vec<GoldenExample>, EvalError> {
    let content = std::fs::read_to_string(path)?;
    let dataset: Vec<GoldenExample> = serde_json::from_str(&content)?;
    if dataset.is_empty() {
        return Err(EvalError::Empty);
    }
    info!(examples = dataset.len(), path = %path.display(), "Loaded golden dataset");
    Ok(dataset)
}

/// Classify every example; classifier errors count as incorrect
pub async fn run_classifier_on_dataset(
    classifier: &dyn Classifier,
    dataset: &[GoldenExample],
) -> Vec<EvalResult> {
    let mut results = Vec::with_capacity(dataset.len());

    for example in dataset {
        let result = match classifier.classify(&example.query, &[]).await {
            Ok(classification) => EvalResult {
                id: example.id.clone(),
                query: example.query.clone(),
                expected_intent: example.intent,
                predicted_intent: Some(classification.intent),
                confidence: Some(classification.confidence),
                correct: classification.intent == example.intent,
                error: None,
            },
            Err(e) => EvalResult {
                id: example.id.clone(),
                query: example.query.clone(),
                expected_intent: example.intent,
                predicted_intent: None,
                confidence: None,
                correct: false,
                error: Some(e.to_string()),
            },
        };
        debug!(id = %result.id, correct = result.correct, "Evaluated example");
        results.push(result);
    }

    results
}

/// Fraction of correct results; 0.0 for no results
pub fn compute_accuracy(results: &[EvalResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().filter(|r| r.correct).count() as f64 / results.len() as f64
}

/// Accuracy grouped by expected intent
pub fn per_intent_accuracy(results: &[EvalResult]) -> BTreeMap<Intent, IntentAccuracy> {
    let mut counts: BTreeMap<Intent, (usize, usize)> = BTreeMap::new();
    for result in results {
        let entry = counts.entry(result.expected_intent).or_default();
        entry.0 += 1;
        if result.correct {
            entry.1 += 1;
        }
    }

    counts
        .into_iter()
        .map(|(intent, (total, correct))| {
            (
                intent,
                IntentAccuracy {
                    total,
                    correct,
                    accuracy: correct as f64 / total as f64,
                },
            )
        })
        .collect()
}
