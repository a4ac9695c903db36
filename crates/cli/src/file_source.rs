//! Text files as context sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::error::SourceError;
use parley_core::source::TextSource;

/// A `--source PATH[:WEIGHT]` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceArg {
    pub path: PathBuf,
    pub weight: f64,
}

impl std::str::FromStr for SourceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("source path must not be empty".into());
        }

        // A suffix that does not parse as a number is part of the path
        // (e.g. `C:\notes.txt`).
        match s.rsplit_once(':') {
            Some((path, weight)) if !path.is_empty() => match weight.parse::<f64>() {
                Ok(weight) if weight.is_finite() && weight >= 0.0 => Ok(Self {
                    path: PathBuf::from(path),
                    weight,
                }),
                Ok(_) => Err(format!("invalid weight '{weight}'")),
                Err(_) => Ok(Self::unweighted(s)),
            },
            _ => Ok(Self::unweighted(s)),
        }
    }
}

impl SourceArg {
    fn unweighted(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            weight: 1.0,
        }
    }
}

/// Serves a text file as paragraphs separated by blank lines.
///
/// The file is re-read on every fetch so edits show up on the next turn.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TextSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn texts(&self, _prompt: &str) -> Result<Vec<String>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::fetch(&self.name, format!("{}: {e}", self.path.display())))?;
        Ok(paragraphs(&content))
    }
}

/// Split on blank lines, dropping empty paragraphs.
pub fn paragraphs(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}
