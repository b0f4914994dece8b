//! Per-project working trees on disk
//!
//! Every project owns a directory under the workspace root; all paths are
//! resolved relative to it and traversal outside is rejected. Reads feeding
//! prompts are bounded so a large tree cannot blow the context window.

use crate::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Directories never walked or served
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "target", ".next"];

/// Per-file byte cap when serializing source for prompts
const SOURCE_FILE_CAP: usize = 32 * 1024;

/// Total byte cap when serializing source for prompts
const SOURCE_TOTAL_CAP: usize = 256 * 1024;

/// One entry in a project tree listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Path relative to the project root
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// Artifact store rooted at the configured workspace directory
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store over the given workspace root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The absolute directory of a project's working tree
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    /// Create the project directory if missing
    pub fn ensure_project(&self, project_id: &str) -> Result<PathBuf> {
        let dir = self.project_dir(project_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove a project's working tree
    pub fn remove_project(&self, project_id: &str) -> Result<()> {
        let dir = self.project_dir(project_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Resolve a relative path inside a project, rejecting traversal
    fn resolve(&self, project_id: &str, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute()
            || rel_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(OrchestratorError::Internal(format!(
                "path escapes project root: {}",
                rel
            )));
        }
        Ok(self.project_dir(project_id).join(rel_path))
    }

    /// Read a file's content
    pub fn read(&self, project_id: &str, rel: &str) -> Result<String> {
        let path = self.resolve(project_id, rel)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, project_id: &str, rel: &str, content: &str) -> Result<()> {
        let path = self.resolve(project_id, rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        debug!(project = project_id, path = rel, bytes = content.len(), "wrote file");
        Ok(())
    }

    /// Whether the project has any files at all
    pub fn has_files(&self, project_id: &str) -> bool {
        !self.list_tree(project_id).is_empty()
    }

    /// Bounded walk of the project tree
    pub fn list_tree(&self, project_id: &str) -> Vec<FileEntry> {
        let dir = self.project_dir(project_id);
        if !dir.exists() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !SKIPPED_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(FileEntry {
                path: rel.to_string_lossy().replace('\\', "/"),
                size,
            });
        }
        entries
    }

    /// Serialize the tree for prompt assembly, with per-file and total caps
    ///
    /// This is what the `project-source` well-known upstream resolves to.
    pub fn serialize_source(&self, project_id: &str) -> String {
        let mut out = String::new();
        let mut total = 0usize;

        for entry in self.list_tree(project_id) {
            if total >= SOURCE_TOTAL_CAP {
                out.push_str("\n[remaining files omitted]\n");
                break;
            }
            let Ok(content) = self.read(project_id, &entry.path) else {
                continue;
            };
            let truncated = if content.len() > SOURCE_FILE_CAP {
                format!("{}\n[truncated]", &content[..SOURCE_FILE_CAP])
            } else {
                content
            };
            total += truncated.len();
            out.push_str(&format!("=== {} ===\n{}\n\n", entry.path, truncated));
        }

        out
    }

    /// Capture the full tree as a path -> content manifest for snapshots
    pub fn manifest(&self, project_id: &str) -> Result<serde_json::Value> {
        let mut manifest = serde_json::Map::new();
        for entry in self.list_tree(project_id) {
            if let Ok(content) = self.read(project_id, &entry.path) {
                manifest.insert(entry.path, serde_json::Value::String(content));
            }
        }
        Ok(serde_json::Value::Object(manifest))
    }

    /// Zip the project tree for download
    pub fn zip(&self, project_id: &str) -> Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);

            for entry in self.list_tree(project_id) {
                let content = self.read(project_id, &entry.path)?;
                writer
                    .start_file(entry.path.as_str(), options)
                    .map_err(|e| OrchestratorError::Internal(format!("zip error: {}", e)))?;
                writer.write_all(content.as_bytes())?;
            }
            writer
                .finish()
                .map_err(|e| OrchestratorError::Internal(format!("zip error: {}", e)))?;
        }
        Ok(buffer.into_inner())
    }
}
