/*!
 * Per-attempt artifacts.
 *
 * Every prompt, raw response and accepted set of parsed entries is written
 * under `<root>/part_NNN/`, keyed by attempt number, so a run can be audited
 * and resumed without consulting the backend again.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::subtitle::SubtitleEntry;

/// Storage for prompts, responses and parsed entries
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the prompt of a chunk
    async fn save_prompt(&self, part: u32, attempt: u32, prompt: &str) -> Result<PathBuf>;

    /// Persist a raw backend response
    async fn save_response(&self, part: u32, attempt: u32, response: &str) -> Result<PathBuf>;

    /// Persist the accepted entries of a chunk
    async fn save_parsed(&self, part: u32, attempt: u32, entries: &[SubtitleEntry]) -> Result<PathBuf>;

    /// Whether a previously written artifact is still present
    async fn exists(&self, path: &Path) -> bool;
}

/// Artifact store backed by a directory tree
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn part_dir(&self, part: u32) -> PathBuf {
        self.root.join(format!("part_{:03}", part))
    }

    pub fn prompt_path(&self, part: u32, attempt: u32) -> PathBuf {
        self.part_dir(part).join(format!("prompt_attempt_{}.txt", attempt))
    }

    pub fn response_path(&self, part: u32, attempt: u32) -> PathBuf {
        self.part_dir(part).join(format!("response_attempt_{}.txt", attempt))
    }

    pub fn parsed_path(&self, part: u32, attempt: u32) -> PathBuf {
        self.part_dir(part).join(format!("parsed_attempt_{}.json", attempt))
    }

    async fn write(&self, path: PathBuf, content: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        Ok(path)
    }

    /// Load accepted entries written by `save_parsed`
    pub async fn load_parsed(path: &Path) -> Result<Vec<SubtitleEntry>> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid parsed artifact: {}", path.display()))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save_prompt(&self, part: u32, attempt: u32, prompt: &str) -> Result<PathBuf> {
        self.write(self.prompt_path(part, attempt), prompt.as_bytes()).await
    }

    async fn save_response(&self, part: u32, attempt: u32, response: &str) -> Result<PathBuf> {
        self.write(self.response_path(part, attempt), response.as_bytes()).await
    }

    async fn save_parsed(&self, part: u32, attempt: u32, entries: &[SubtitleEntry]) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(entries).context("Failed to serialize parsed entries")?;
        self.write(self.parsed_path(part, attempt), &json).await
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
