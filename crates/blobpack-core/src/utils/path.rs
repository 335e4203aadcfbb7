//! Path utilities for building bundle index keys.
//!
//! Index keys are lexical: they never touch the file system, so the same
//! absolute path always produces the same key regardless of what is on disk.

use std::path::{Component, Path, PathBuf};

/// Marker every index key starts with.
pub const KEY_PREFIX: &str = "./";

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {
                // Skip current directory
            },
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                },
                // `/..` is still `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {},
                _ => components.push(component),
            },
            other => {
                components.push(other);
            },
        }
    }

    components.iter().collect()
}

/// Build the index key for `path` relative to `base_dir`.
///
/// The key always uses `/` as separator and starts with `./`, e.g.
/// `relative_key("/proj", "/proj/sub/b.txt") == "./sub/b.txt"`.
/// Paths outside `base_dir` keep their `..` components.
pub fn relative_key(base_dir: &Path, path: &Path) -> String {
    let base = normalize_path(base_dir);
    let target = normalize_path(path);

    let relative = pathdiff::diff_paths(&target, &base).unwrap_or(target);

    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();

    format!("{}{}", KEY_PREFIX, segments.join("/"))
}

/// Get the file extension as a lowercase string
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
