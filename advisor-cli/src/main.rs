//! advisor-cli: command-line frontend for the business advisor HTTP API
//!
//! # Subcommands
//! - `ask <question> [--json]`: ask a business question (chart requests render a chart)
//! - `chart <description> [--json]`: render a chart from a description
//! - `status`: show server health

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8766";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "advisor-cli", version, about = "Business advisor command-line client")]
struct Cli {
    /// Advisor HTTP server URL (overrides ADVISOR_HTTP_URL env var)
    #[arg(long, env = "ADVISOR_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask a business question
    Ask {
        /// Question text
        question: String,

        /// Print the raw JSON reply
        #[arg(long)]
        json: bool,
    },

    /// Render a chart from a natural-language description
    Chart {
        /// Chart description
        description: String,

        /// Print the raw JSON reply
        #[arg(long)]
        json: bool,
    },

    /// Show advisor server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Reply envelope from POST /ask and POST /chart
#[derive(Debug, Deserialize)]
pub struct ReplyView {
    pub success: bool,
    pub category: String,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
    #[serde(default)]
    pub text: String,
    pub image_reference: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub cached: bool,
    pub took_ms: Option<u64>,
}

/// Human-readable rendering of a reply.
pub fn render_reply(reply: &ReplyView, server: &str) -> String {
    let mut out = String::new();

    let confidence = reply
        .probabilities
        .get(&reply.category)
        .map(|p| format!(" ({:.0}%)", p * 100.0))
        .unwrap_or_default();
    let cached = if reply.cached { ", cached" } else { "" };
    out.push_str(&format!("[{}{}{}]\n", reply.category, confidence, cached));

    if reply.success {
        out.push_str(reply.text.trim_end());
        out.push('\n');
        if let Some(image) = &reply.image_reference {
            out.push_str(&format!("Image: {}/{}\n", server, image));
        }
    } else {
        out.push_str(&format!(
            "Error: {}\n",
            reply.error.as_deref().unwrap_or("unknown error")
        ));
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

/// POST a JSON body and print the reply.
///
/// Chart rendering can take up to the server's execution timeout plus the
/// model call, so the client timeout is generous.
fn do_post(
    server: &str,
    endpoint: &str,
    body: serde_json::Value,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(180))
        .build()?;

    let url = format!("{}/{}", server, endpoint);
    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("advisor-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("advisor-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let raw: serde_json::Value = match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("advisor-cli: failed to parse reply: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let reply: ReplyView = serde_json::from_value(raw)?;
    print!("{}", render_reply(&reply, server));
    if !reply.success {
        std::process::exit(2);
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            let c = &body["components"];
            println!("Advisor server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
            println!("Chat model:     {}", c["chat_model"].as_str().unwrap_or("?"));
            let classifier = if c["classifier_loaded"].as_bool().unwrap_or(false) {
                "loaded"
            } else {
                "keyword heuristic"
            };
            println!("Classifier:     {}", classifier);
            println!("Token counter:  {}", c["token_counter"].as_str().unwrap_or("?"));
            println!("Interpreter:    {}", c["interpreter"].as_str().unwrap_or("?"));
            println!(
                "Cache:          {}/{}",
                c["cache_entries"].as_u64().unwrap_or(0),
                c["cache_capacity"].as_u64().unwrap_or(0)
            );
        }
        Ok(r) => {
            eprintln!("advisor-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("advisor-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Ask { question, json } => {
            do_post(&server, "ask", serde_json::json!({ "question": question }), json)
        }
        Commands::Chart { description, json } => do_post(
            &server,
            "chart",
            serde_json::json!({ "description": description }),
            json,
        ),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("advisor-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
