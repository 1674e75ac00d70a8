use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output envelope of the assistant for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub success: bool,
    /// Chosen category label, or `quick_response` for canned answers.
    pub category: String,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f32>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

impl AssistantReply {
    pub fn failure(category: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            category: category.into(),
            probabilities: BTreeMap::new(),
            text: String::new(),
            image_reference: None,
            error: Some(error.into()),
            cached: false,
            timestamp: Utc::now(),
        }
    }
}
