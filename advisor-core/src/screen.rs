//! Safety screen for generated code
//!
//! Case-insensitive substring denylist. This blocks known-bad syntax only;
//! it is not a capability sandbox.

use thiserror::Error;

/// Fixed denylist, checked in order. All entries are lowercase.
pub const DENYLIST: &[&str] = &[
    // process spawning
    "os.system",
    "os.popen",
    "subprocess",
    // dynamic evaluation / compilation / imports
    "eval(",
    "exec(",
    "compile(",
    "__import__",
    "importlib",
    // raw networking
    "import socket",
    "import requests",
    "import urllib",
    // interpreter and environment access
    "import os",
    "import sys",
    // unbounded loops
    "while true:",
    "for _ in range(1000000):",
    // binary modules
    ".pyc",
    ".so",
    ".dll",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsafe code detected: {pattern}")]
pub struct SafetyViolation {
    pub pattern: String,
}

/// Reject `code` on the first denylisted pattern it contains.
pub fn screen(code: &str) -> Result<(), SafetyViolation> {
    let lowered = code.to_lowercase();
    match DENYLIST.iter().find(|p| lowered.contains(*p)) {
        Some(pattern) => {
            tracing::warn!(pattern = *pattern, "Generated code rejected by safety screen");
            Err(SafetyViolation {
                pattern: (*pattern).to_string(),
            })
        }
        None => Ok(()),
    }
}
