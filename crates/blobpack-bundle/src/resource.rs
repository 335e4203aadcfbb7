//! Resource descriptions accepted by the bundler

use std::fmt;
use std::path::{Path, PathBuf};

use blobpack_core::utils::path::get_extension;

/// One unit of input: a path plus either inline content or a deferred file read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    path: PathBuf,
    content: Option<Vec<u8>>,
}

impl Resource {
    /// Resource whose bytes are read from `path` at drain time
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    /// Resource registered under `path` whose bytes are already in memory
    pub fn inline<P: Into<PathBuf>, C: Into<Vec<u8>>>(path: P, content: C) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// Source path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inline content, if any
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Transformable kind implied by the file extension
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_path(&self.path)
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Option<Vec<u8>>) {
        (self.path, self.content)
    }
}

/// Kinds of content a transform may rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// JavaScript source
    Script,
    /// JSON data
    Data,
}

impl ResourceKind {
    /// Classify a path by extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match get_extension(path)?.as_str() {
            "js" | "mjs" | "cjs" => Some(Self::Script),
            "json" => Some(Self::Data),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Script => write!(f, "script"),
            ResourceKind::Data => write!(f, "data"),
        }
    }
}
