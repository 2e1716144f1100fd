use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::chunk::{Chunk, ChunkStatus};
use crate::file_utils::FileManager;

// @module: Chunk manifest persistence

/// The list of chunks of one transcript, as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifest {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl ChunkManifest {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let mut manifest = Self { chunks };
        manifest.chunks.sort_by_key(|c| c.part_number);
        manifest
    }

    /// Load a manifest, rejecting duplicate part numbers
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        let manifest: ChunkManifest = serde_json::from_str(&content)
            .with_context(|| format!("Invalid chunk manifest: {}", path.display()))?;

        let mut seen = HashSet::new();
        for chunk in &manifest.chunks {
            if !seen.insert(chunk.part_number) {
                return Err(anyhow!("Duplicate part number {} in {}", chunk.part_number, path.display()));
            }
        }

        debug!("Loaded {} chunks from {}", manifest.chunks.len(), path.display());
        Ok(Self::new(manifest.chunks))
    }

    /// Write the manifest atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize chunk manifest")?;
        FileManager::write_atomic(path, &json)
    }

    pub fn get(&self, part_number: u32) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.part_number == part_number)
    }

    pub fn get_mut(&mut self, part_number: u32) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.part_number == part_number)
    }

    /// Replace the chunk with the same part number, or insert it in order
    pub fn upsert(&mut self, chunk: Chunk) {
        match self.chunks.binary_search_by_key(&chunk.part_number, |c| c.part_number) {
            Ok(index) => self.chunks[index] = chunk,
            Err(index) => self.chunks.insert(index, chunk),
        }
    }

    pub fn count_by_status(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }
}
