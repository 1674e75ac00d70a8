use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Topic labels the router can assign. `Graphic` marks chart requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Marketing,
    Finance,
    Legal,
    Management,
    Sales,
    General,
    Graphic,
}

impl Category {
    /// Output order of the classifier model's logits.
    pub const ALL: [Category; 7] = [
        Category::Marketing,
        Category::Finance,
        Category::Legal,
        Category::Management,
        Category::Sales,
        Category::General,
        Category::Graphic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Marketing => "marketing",
            Category::Finance => "finance",
            Category::Legal => "legal",
            Category::Management => "management",
            Category::Sales => "sales",
            Category::General => "general",
            Category::Graphic => "graphic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Router output: the argmax label plus the per-label scores it was chosen from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrediction {
    pub label: Category,
    pub probabilities: BTreeMap<Category, f32>,
}

impl CategoryPrediction {
    /// Build a prediction from per-label scores, picking the argmax.
    ///
    /// Ties go to the label listed first in `Category::ALL`. Returns `None` for an empty map.
    pub fn from_scores(probabilities: BTreeMap<Category, f32>) -> Option<Self> {
        let mut best: Option<(Category, f32)> = None;
        for category in Category::ALL {
            if let Some(&p) = probabilities.get(&category) {
                match best {
                    Some((_, bp)) if p <= bp => {}
                    _ => best = Some((category, p)),
                }
            }
        }
        best.map(|(label, _)| Self {
            label,
            probabilities,
        })
    }

    /// Score of the chosen label.
    pub fn confidence(&self) -> f32 {
        self.probabilities.get(&self.label).copied().unwrap_or(0.0)
    }
}
