//! Metadata derived from a source file before conversion.

use serde::{Deserialize, Serialize};

/// Which conversion path a source takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Ordinary code, converted through the refinement pipeline.
    #[default]
    General,
    /// Data-access code, converted in one domain-specific pass.
    DataAccess,
}

/// Size band of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Up to 300 lines.
    Simple,
    /// Up to 700 lines.
    Medium,
    /// More than 700 lines.
    Complex,
}

impl Complexity {
    /// Classifies a source by line count.
    #[must_use]
    pub fn from_line_count(lines: usize) -> Self {
        match lines {
            0..=300 => Self::Simple,
            301..=700 => Self::Medium,
            _ => Self::Complex,
        }
    }
}

/// Facts about a source file gathered without calling the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name (no directories).
    pub filename: String,
    /// Conversion path.
    pub kind: SourceKind,
    /// Size band.
    pub complexity: Complexity,
    /// Number of lines.
    pub line_count: usize,
    /// `#include` directives, trimmed, in source order.
    pub dependencies: Vec<String>,
}

impl SourceMetadata {
    /// Derives metadata from an identifier (usually a path) and the source text.
    #[must_use]
    pub fn detect(identifier: &str, source: &str) -> Self {
        let filename = identifier
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(identifier)
            .to_string();

        let kind = if filename.to_lowercase().contains("dbio")
            || source.to_lowercase().contains("sql")
        {
            SourceKind::DataAccess
        } else {
            SourceKind::General
        };

        let line_count = source.split('\n').count();
        let dependencies = source
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("#include"))
            .map(str::to_string)
            .collect();

        Self {
            filename,
            kind,
            complexity: Complexity::from_line_count(line_count),
            line_count,
            dependencies,
        }
    }
}
