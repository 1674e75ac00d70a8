//! Artifact store for rendered charts
//!
//! Files are written as `<tag>_<12 hex>.<ext>` directly under the assets
//! root and referenced externally as `assets/<filename>`.

use std::io;
use std::path::{Path, PathBuf};

use crate::models::Artifact;

/// Prefix of every returned reference.
pub const ASSETS_PREFIX: &str = "assets";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh random name. Collisions are not checked.
    pub async fn persist(&self, bytes: &[u8], tag: &str, mime_type: &str) -> io::Result<Artifact> {
        tokio::fs::create_dir_all(&self.root).await?;

        let filename = format!("{tag}_{}.{}", random_hex12(), extension_for(mime_type));
        tokio::fs::write(self.root.join(&filename), bytes).await?;

        tracing::info!(file = %filename, bytes = bytes.len(), "Persisted artifact");

        Ok(Artifact {
            relative_path: format!("{ASSETS_PREFIX}/{filename}"),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
        })
    }

    /// Read a stored artifact by bare filename.
    ///
    /// Names containing path separators or `..` are rejected as `InvalidInput`.
    pub async fn read(&self, filename: &str) -> io::Result<Artifact> {
        if !is_plain_filename(filename) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid artifact name: {filename}"),
            ));
        }

        let bytes = tokio::fs::read(self.root.join(filename)).await?;
        Ok(Artifact {
            relative_path: format!("{ASSETS_PREFIX}/{filename}"),
            mime_type: mime_for(filename).to_string(),
            bytes,
        })
    }
}

fn random_hex12() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(12);
    hex
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        _ => "png",
    }
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "image/png",
    }
}
