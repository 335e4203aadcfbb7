//! JavaScript minification on top of the oxc toolchain

use oxc_allocator::Allocator;
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use super::{ContentTransform, TransformError};
use crate::resource::ResourceKind;

/// Minifies JavaScript sources.
///
/// The source is parsed first so that a syntax error is reported instead of
/// producing mangled output; the bundler then packs the original bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptMinifier;

impl ContentTransform for ScriptMinifier {
    fn name(&self) -> &str {
        "script-minify"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Script
    }

    fn transform(&self, kind: ResourceKind, raw: &[u8]) -> Result<Vec<u8>, TransformError> {
        if kind != ResourceKind::Script {
            return Err(TransformError::Unsupported { kind });
        }

        let source = std::str::from_utf8(raw)
            .map_err(|e| TransformError::Other(format!("script is not valid UTF-8: {}", e)))?;
        let source_type = SourceType::default().with_module(true);

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            return Err(TransformError::Parse {
                message: error.to_string(),
            });
        }
        if parsed.panicked {
            return Err(TransformError::Parse {
                message: "parser gave up on this source".to_string(),
            });
        }

        let minified = Minifier::new(source, source_type, MinifierOptions::default()).build();
        Ok(minified.into_bytes())
    }
}
