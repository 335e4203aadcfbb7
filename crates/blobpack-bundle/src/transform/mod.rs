//! Content transforms applied before a resource's length is committed

use serde::de::IgnoredAny;
use thiserror::Error;

use crate::resource::ResourceKind;

mod script;

pub use script::ScriptMinifier;

/// Failure reported by a [`ContentTransform`].
///
/// Never fatal to a bundle: the bundler logs it and packs the original bytes.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("{kind} content is not supported by this transform")]
    Unsupported { kind: ResourceKind },

    #[error("{0}")]
    Other(String),
}

/// Pluggable byte rewriter, e.g. a minifier.
pub trait ContentTransform: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Whether this transform handles `kind` at all
    fn supports(&self, kind: ResourceKind) -> bool {
        let _ = kind;
        true
    }

    /// Rewrite `raw` into the bytes that will be packed
    fn transform(&self, kind: ResourceKind, raw: &[u8]) -> Result<Vec<u8>, TransformError>;
}

/// Minifies JSON data by removing insignificant whitespace.
///
/// Key order, duplicate keys and number spelling are kept exactly as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMinifier;

impl ContentTransform for JsonMinifier {
    fn name(&self) -> &str {
        "json-minify"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Data
    }

    fn transform(&self, kind: ResourceKind, raw: &[u8]) -> Result<Vec<u8>, TransformError> {
        if kind != ResourceKind::Data {
            return Err(TransformError::Unsupported { kind });
        }

        serde_json::from_slice::<IgnoredAny>(raw).map_err(|e| TransformError::Syntax {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        })?;

        Ok(strip_json_whitespace(raw))
    }
}

/// Minifies every kind the built-in transforms know: scripts through
/// [`ScriptMinifier`] and JSON through [`JsonMinifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceMinifier;

impl ContentTransform for ResourceMinifier {
    fn name(&self) -> &str {
        "minify"
    }

    fn transform(&self, kind: ResourceKind, raw: &[u8]) -> Result<Vec<u8>, TransformError> {
        match kind {
            ResourceKind::Script => ScriptMinifier.transform(kind, raw),
            ResourceKind::Data => JsonMinifier.transform(kind, raw),
        }
    }
}

/// Drop whitespace outside string literals. Input must already be valid JSON.
fn strip_json_whitespace(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for &byte in raw {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b' ' | b'\t' | b'\n' | b'\r' => {},
            b'"' => {
                in_string = true;
                out.push(byte);
            },
            _ => out.push(byte),
        }
    }

    out
}
