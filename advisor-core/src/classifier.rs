//! Category router: maps free text to one of the fixed topic labels
//!
//! The router asks the statistical `CategoryModel` first. When no model is
//! loaded, or the model fails at predict time, it degrades to a keyword
//! heuristic that cannot fail, so callers always get a usable label.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Category, CategoryPrediction};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier model not found at {path}")]
    ModelNotFound { path: String },

    #[error("classifier inference error: {0}")]
    Inference(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

/// Statistical classifier contract. Deterministic for a fixed model snapshot.
#[async_trait]
pub trait CategoryModel: Send + Sync {
    async fn predict(&self, text: &str) -> Result<CategoryPrediction, ClassifierError>;

    /// Model name for logging.
    fn name(&self) -> &str;
}

/// Keyword lists scanned by the heuristic, as lowercase substrings.
const KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Graphic,
        &[
            "chart", "graph", "plot", "histogram", "diagram", "visualiz", "график",
            "диаграмм", "визуализ", "гистограмм", "построй",
        ],
    ),
    (
        Category::Marketing,
        &[
            "marketing", "advertis", "promotion", "brand", "smm", "seo", "conversion",
            "targeting", "campaign", "маркетинг", "реклам", "продвижен", "бренд",
            "конверси", "таргетинг",
        ],
    ),
    (
        Category::Finance,
        &[
            "financ", "budget", "tax", "invest", "credit", "loan", "cash flow", "profitab",
            "accounting", "финанс", "бюджет", "налог", "инвестиц", "кредит", "деньг",
            "отчетност", "рентабельн",
        ],
    ),
    (
        Category::Legal,
        &[
            "legal", "contract", "law", "licens", "registration", "court", "complian",
            "юридич", "договор", "правов", "закон", "лиценз", "регистрац", "суд", "исков",
        ],
    ),
    (
        Category::Management,
        &[
            "manag", "team", "staff", "personnel", "process", "optimiz", "kpi", "motivat",
            "leadership", "управлен", "команд", "персонал", "процесс", "оптимизац",
            "мотивац", "руководств",
        ],
    ),
    (
        Category::Sales,
        &[
            "sales", "sell", "customer", "client", "deal", "lead", "crm", "objection",
            "продаж", "клиент", "сделк", "лид", "возражен", "коммерческ",
        ],
    ),
    (
        Category::General,
        &[
            "business", "startup", "company", "growth", "strategy", "бизнес", "стартап",
            "компани", "развити", "стратеги",
        ],
    ),
];

/// Keyword-heuristic classification. Never fails.
///
/// Picks the category with the most keyword hits; ties go to the category
/// listed first in `KEYWORDS` (chart vocabulary first). No hits at all yields
/// `general` with probability 1.0.
pub fn keyword_prediction(text: &str) -> CategoryPrediction {
    let lower = text.to_lowercase();

    let mut best: Option<(Category, usize)> = None;
    for (category, words) in KEYWORDS {
        let hits = words.iter().filter(|w| lower.contains(*w)).count();
        if hits == 0 {
            continue;
        }
        match best {
            Some((_, best_hits)) if hits <= best_hits => {}
            _ => best = Some((*category, hits)),
        }
    }

    let mut probabilities = BTreeMap::new();
    match best {
        Some((label, _)) if label != Category::General => {
            probabilities.insert(label, 0.8);
            probabilities.insert(Category::General, 0.2);
            CategoryPrediction {
                label,
                probabilities,
            }
        }
        _ => {
            probabilities.insert(Category::General, 1.0);
            CategoryPrediction {
                label: Category::General,
                probabilities,
            }
        }
    }
}

/// Routes text to a category, with the keyword heuristic as the last line of defense.
#[derive(Clone, Default)]
pub struct CategoryRouter {
    model: Option<Arc<dyn CategoryModel>>,
}

impl CategoryRouter {
    pub fn new(model: Option<Arc<dyn CategoryModel>>) -> Self {
        Self { model }
    }

    /// Router without a statistical model; every call uses the heuristic.
    pub fn heuristic() -> Self {
        Self { model: None }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub async fn classify(&self, text: &str) -> CategoryPrediction {
        let Some(model) = &self.model else {
            return keyword_prediction(text);
        };

        match model.predict(text).await {
            Ok(prediction) if prediction.probabilities.contains_key(&prediction.label) => {
                tracing::debug!(
                    model = model.name(),
                    label = %prediction.label,
                    confidence = prediction.confidence(),
                    "Classified question"
                );
                prediction
            }
            Ok(prediction) => {
                tracing::warn!(
                    model = model.name(),
                    label = %prediction.label,
                    "Model label missing from its probability map, using keyword heuristic"
                );
                keyword_prediction(text)
            }
            Err(e) => {
                tracing::warn!(
                    model = model.name(),
                    error = %e,
                    "Classifier unavailable, using keyword heuristic"
                );
                keyword_prediction(text)
            }
        }
    }
}
