//! Code synthesizer: turns a chart description into plotting code
//!
//! The model is asked for matplotlib code that writes `ARTIFACT_FILENAME`.
//! Its reply is free text, so extraction runs an ordered list of strategies
//! and keeps the first non-empty result. The candidate is then normalized
//! (headless backend, missing imports, save call) before it is screened.

use std::sync::Arc;

use regex::Regex;

use crate::llm::{ChatModel, LlmError};
use crate::models::ChatMessage;

/// File the generated code must write; the executor looks for exactly this name.
pub const ARTIFACT_FILENAME: &str = "graph_output.png";

const CHART_SYSTEM_PROMPT: &str = r#"You translate user requests into Python code that draws charts.
The user describes the chart they need. Produce working Python code.

Code requirements:
1. Use matplotlib (and numpy when needed)
2. Save the result to the file 'graph_output.png'
3. Never call plt.show(); only save the figure
4. Return only clean Python code without explanations

Example:
Request: "sine chart from 0 to 10"
Code:
```python
import matplotlib.pyplot as plt
import numpy as np
x = np.linspace(0, 10, 100)
y = np.sin(x)
plt.figure(figsize=(10, 6))
plt.plot(x, y)
plt.savefig('graph_output.png')
plt.close()
```"#;

/// Markers of plotting code, used by the fence and line-filter strategies.
const PLOTTING_MARKERS: &[&str] = &["import ", "plt.", "sns.", "savefig", "np."];

type Extractor = fn(&str) -> Option<String>;

/// Extraction strategies in priority order.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("tagged_fence", extract_tagged_fence),
    ("plotting_fence", extract_plotting_fence),
    ("line_filter", extract_plotting_lines),
    ("whole_reply", extract_whole_reply),
];

pub struct CodeSynthesizer {
    model: Arc<dyn ChatModel>,
}

impl CodeSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Ask the model for chart code. `Ok(None)` when no strategy finds any code.
    pub async fn synthesize(&self, chart_request: &str) -> Result<Option<String>, LlmError> {
        let messages = [
            ChatMessage::system(CHART_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Write Python code for a chart matching this request: {chart_request}"
            )),
        ];

        let reply = self.model.complete(&messages).await?;
        let code = extract_code(&reply).map(|c| normalize_code(&c));

        match &code {
            Some(c) => tracing::info!(lines = c.lines().count(), "Synthesized chart code"),
            None => tracing::warn!(reply_len = reply.len(), "No code found in model reply"),
        }

        Ok(code)
    }
}

/// Run the extraction strategies in order; first non-empty result wins.
pub fn extract_code(reply: &str) -> Option<String> {
    if reply.trim().is_empty() {
        return None;
    }

    for (name, extractor) in EXTRACTORS {
        if let Some(code) = extractor(reply) {
            if !code.trim().is_empty() {
                tracing::debug!(strategy = *name, "Extracted code candidate");
                return Some(code);
            }
        }
    }
    None
}

struct Fence {
    tag: String,
    body: String,
}

/// Split a reply into its fenced blocks. An unclosed fence runs to the end.
fn fences(reply: &str) -> Vec<Fence> {
    let mut out = Vec::new();
    let mut current: Option<Fence> = None;

    for line in reply.lines() {
        let trimmed = line.trim();
        match current.take() {
            None => {
                if let Some(rest) = trimmed.strip_prefix("```") {
                    current = Some(Fence {
                        tag: rest.trim().to_lowercase(),
                        body: String::new(),
                    });
                }
            }
            Some(mut fence) => {
                if trimmed.starts_with("```") {
                    out.push(fence);
                } else {
                    fence.body.push_str(line);
                    fence.body.push('\n');
                    current = Some(fence);
                }
            }
        }
    }
    if let Some(fence) = current {
        out.push(fence);
    }
    out
}

fn looks_like_plotting(code: &str) -> bool {
    PLOTTING_MARKERS.iter().any(|m| code.contains(m))
}

fn extract_tagged_fence(reply: &str) -> Option<String> {
    let blocks: Vec<String> = fences(reply)
        .into_iter()
        .filter(|f| matches!(f.tag.as_str(), "python" | "py" | "python3"))
        .map(|f| f.body.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    (!blocks.is_empty()).then(|| blocks.join("\n\n"))
}

fn extract_plotting_fence(reply: &str) -> Option<String> {
    fences(reply)
        .into_iter()
        .map(|f| f.body.trim().to_string())
        .find(|b| looks_like_plotting(b))
}

fn extract_plotting_lines(reply: &str) -> Option<String> {
    let lines: Vec<&str> = reply
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .filter(|l| looks_like_plotting(l))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n").trim().to_string())
}

fn extract_whole_reply(reply: &str) -> Option<String> {
    (reply.contains("import ") || reply.contains("plt.")).then(|| reply.trim().to_string())
}

/// Make a candidate runnable headless and guarantee it writes `ARTIFACT_FILENAME`.
pub fn normalize_code(code: &str) -> String {
    let mut body = code.trim().to_string();

    // Point every savefig at the fixed artifact name.
    if let Ok(re) = Regex::new(r#"savefig\(\s*(?:[rRbBfF]?)(['"])[^'"]*(['"])"#) {
        body = re
            .replace_all(&body, format!("savefig('{ARTIFACT_FILENAME}'").as_str())
            .into_owned();
    }

    // plt.show() would block or fail without a display.
    if let Ok(re) = Regex::new(r"(?m)^(\s*)plt\.show\(\s*\)\s*$") {
        body = re.replace_all(&body, "${1}pass").into_owned();
    }

    let mut header: Vec<String> = Vec::new();
    if !body.contains("matplotlib.use(") {
        header.push("import matplotlib".to_string());
        header.push("matplotlib.use('Agg')".to_string());
    }
    if body.contains("plt.") && !body.contains("import matplotlib.pyplot as plt") {
        header.push("import matplotlib.pyplot as plt".to_string());
    }
    if body.contains("np.") && !body.contains("import numpy as np") {
        header.push("import numpy as np".to_string());
    }

    let mut out = header.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&body);

    if !body.contains("savefig") {
        out.push_str(&format!(
            "\nimport matplotlib.pyplot as plt\nplt.savefig('{ARTIFACT_FILENAME}')\nplt.close()"
        ));
    }
    out.push('\n');
    out
}
