//! Unit tests for the registration orchestrator

use super::*;
use crate::transform::{JsonMinifier, ResourceMinifier, TransformError};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::{tempdir, TempDir};
use tokio::io::AsyncReadExt;

/// Transform that always reports a failure
struct FailingTransform {
    calls: AtomicUsize,
}

impl ContentTransform for FailingTransform {
    fn name(&self) -> &str {
        "failing"
    }

    fn transform(&self, _kind: ResourceKind, _raw: &[u8]) -> Result<Vec<u8>, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransformError::Other("unexpected token".to_string()))
    }
}

/// Transform that upper-cases scripts
struct Shout;

impl ContentTransform for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Script
    }

    fn transform(&self, _kind: ResourceKind, raw: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(raw.to_ascii_uppercase())
    }
}

fn project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
    temp_dir
}

async fn drain(bundler: Bundler) -> Vec<u8> {
    let mut out = Vec::new();
    bundler.into_stream().read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn test_inline_and_file_scenario() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("sub/b.txt"), "world").unwrap();

    let mut bundler = Bundler::new(base);
    let a = bundler.add_inline(base.join("a.txt"), "hi").await.unwrap();
    let b = bundler.add_file(base.join("sub/b.txt")).await.unwrap();

    assert_eq!(a, IndexEntry::new(0, 2));
    assert_eq!(b, IndexEntry::new(2, 5));
    assert_eq!(bundler.blob_size(), 7);
    assert_eq!(
        bundler.to_json().unwrap(),
        r#"{"./a.txt":[0,2],"./sub/b.txt":[2,5]}"#
    );

    let blob = drain(bundler).await;
    assert_eq!(blob.len(), 7);
    assert_eq!(&blob[..2], b"hi");
    assert_eq!(&blob[2..], b"world");
}

#[tokio::test]
async fn test_inline_needs_no_file_system() {
    let mut bundler = Bundler::new("/proj");
    bundler.add_inline("/proj/a.txt", "hi").await.unwrap();
    bundler.add_inline("/proj/lib/x.js", vec![1u8, 2, 3]).await.unwrap();

    let index = bundler.index();
    assert_eq!(index.get("./a.txt"), Some(IndexEntry::new(0, 2)));
    assert_eq!(index.get("./lib/x.js"), Some(IndexEntry::new(2, 3)));
    assert_eq!(drain(bundler).await, vec![b'h', b'i', 1, 2, 3]);
}

#[tokio::test]
async fn test_reregistration_keeps_old_bytes() {
    let mut bundler = Bundler::new("/proj");
    bundler.add_inline("/proj/a.txt", "old").await.unwrap();
    bundler.add_inline("/proj/b.txt", "bb").await.unwrap();
    let again = bundler.add_inline("/proj/sub/../a.txt", "newer").await.unwrap();

    assert_eq!(again, IndexEntry::new(5, 5));
    assert_eq!(bundler.len(), 3);
    assert_eq!(bundler.index().len(), 2);
    assert_eq!(bundler.blob_size(), 10);

    let blob = drain(bundler).await;
    assert_eq!(blob, b"oldbbnewer");
    assert_eq!(&blob[5..10], b"newer");
}

#[tokio::test]
async fn test_relative_paths_resolve_against_base() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("sub/c.txt"), "abc").unwrap();

    let mut bundler = Bundler::new(base);
    let entry = bundler.add_file("sub/c.txt").await.unwrap();
    assert_eq!(entry, IndexEntry::new(0, 3));
    assert!(bundler.index().contains_key("./sub/c.txt"));
    assert_eq!(drain(bundler).await, b"abc");
}

#[tokio::test]
async fn test_transform_rewrites_eligible_files() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("package.json"), "{\n  \"name\": \"demo\"\n}\n").unwrap();
    fs::write(base.join("notes.txt"), "{ \"left\": \"alone\" }").unwrap();

    let mut bundler = Bundler::new(base).with_transform(Arc::new(JsonMinifier));
    assert!(bundler.transform_enabled());
    let json = bundler.add_file(base.join("package.json")).await.unwrap();
    let text = bundler.add_file(base.join("notes.txt")).await.unwrap();

    assert_eq!(json, IndexEntry::new(0, 15));
    assert_eq!(text.length, 19);

    let blob = drain(bundler).await;
    assert_eq!(&blob[..15], br#"{"name":"demo"}"#);
    assert_eq!(&blob[15..], br#"{ "left": "alone" }"#);
}

#[tokio::test]
async fn test_transform_disabled_packs_original() {
    let temp_dir = project();
    let base = temp_dir.path();
    let original = "{ \"a\": 1 }";
    fs::write(base.join("data.json"), original).unwrap();

    let mut bundler = Bundler::new(base);
    let entry = bundler.add_file(base.join("data.json")).await.unwrap();
    assert_eq!(entry.length, original.len() as u64);
    assert_eq!(drain(bundler).await, original.as_bytes());
}

#[tokio::test]
async fn test_transform_failure_falls_back_to_original() {
    let temp_dir = project();
    let base = temp_dir.path();
    let original = "function broken( {";
    fs::write(base.join("sub/app.js"), original).unwrap();

    let failing = Arc::new(FailingTransform {
        calls: AtomicUsize::new(0),
    });
    let mut bundler = Bundler::new(base).with_transform(failing.clone());
    let entry = bundler.add_file(base.join("sub/app.js")).await.unwrap();

    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(entry, IndexEntry::new(0, original.len() as u64));
    assert_eq!(drain(bundler).await, original.as_bytes());
}

#[tokio::test]
async fn test_script_minify_keeps_broken_scripts_intact() {
    let temp_dir = project();
    let base = temp_dir.path();
    let good = "export function greet(name) {\n    return 'hello ' + name;\n}\n";
    let broken = "function broken( {\n";
    fs::write(base.join("good.js"), good).unwrap();
    fs::write(base.join("broken.js"), broken).unwrap();

    let mut bundler = Bundler::new(base).with_transform(Arc::new(ResourceMinifier));
    let minified = bundler.add_file(base.join("good.js")).await.unwrap();
    let kept = bundler.add_file(base.join("broken.js")).await.unwrap();

    assert!(minified.length < good.len() as u64);
    assert_eq!(kept.length, broken.len() as u64);

    let blob = drain(bundler).await;
    let kept_start = kept.start as usize;
    assert_eq!(&blob[kept_start..], broken.as_bytes());
}

#[tokio::test]
async fn test_transform_skips_unsupported_kinds() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("app.js"), "let a = 1;").unwrap();
    fs::write(base.join("conf.json"), "{ }").unwrap();

    let mut bundler = Bundler::new(base).with_transform(Arc::new(Shout));
    bundler.add_file(base.join("app.js")).await.unwrap();
    bundler.add_file(base.join("conf.json")).await.unwrap();

    assert_eq!(drain(bundler).await, b"LET A = 1;{ }");
}

#[tokio::test]
async fn test_inline_content_bypasses_transform() {
    let failing = Arc::new(FailingTransform {
        calls: AtomicUsize::new(0),
    });
    let mut bundler = Bundler::new("/proj").with_transform(failing.clone());
    bundler.add_inline("/proj/a.js", "let a;").await.unwrap();

    assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
    assert_eq!(drain(bundler).await, b"let a;");
}

#[tokio::test]
async fn test_missing_file_registers_nothing() {
    let temp_dir = project();
    let base = temp_dir.path();

    let mut bundler = Bundler::new(base);
    let err = bundler.add_file(base.join("missing.txt")).await.unwrap_err();

    match err {
        BlobpackError::Io { message, source } => {
            assert!(message.contains("missing.txt"));
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(bundler.is_empty());
    assert_eq!(bundler.blob_size(), 0);
    assert!(bundler.index().is_empty());
}

#[tokio::test]
async fn test_directory_is_rejected() {
    let temp_dir = project();
    let mut bundler = Bundler::new(temp_dir.path());
    let err = bundler.add_file(temp_dir.path().join("sub")).await.unwrap_err();
    assert!(matches!(err, BlobpackError::Io { .. }));
    assert!(bundler.is_empty());
}

#[tokio::test]
async fn test_file_shrinking_before_drain_fails() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("a.txt"), "0123456789").unwrap();
    fs::write(base.join("b.txt"), "tail").unwrap();

    let mut bundler = Bundler::new(base);
    bundler.add_file(base.join("a.txt")).await.unwrap();
    bundler.add_file(base.join("b.txt")).await.unwrap();
    fs::write(base.join("a.txt"), "0123").unwrap();

    let mut out = Vec::new();
    let err = bundler.write_to(&mut out).await.unwrap_err();
    match err {
        BlobpackError::LengthMismatch { key, expected, actual } => {
            assert_eq!(key, "./a.txt");
            assert_eq!(expected, 10);
            assert_eq!(actual, 4);
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_file_growing_before_drain_fails() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("a.txt"), "abc").unwrap();

    let mut bundler = Bundler::new(base);
    bundler.add_file(base.join("a.txt")).await.unwrap();
    fs::write(base.join("a.txt"), "abcdef").unwrap();

    let mut out = Vec::new();
    let err = bundler.write_to(&mut out).await.unwrap_err();
    assert!(matches!(err, BlobpackError::LengthMismatch { expected: 3, .. }));
}

#[tokio::test]
async fn test_file_deleted_before_drain_fails() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("gone.txt"), "abc").unwrap();

    let mut bundler = Bundler::new(base);
    bundler.add_file(base.join("gone.txt")).await.unwrap();
    fs::remove_file(base.join("gone.txt")).unwrap();

    let mut out = Vec::new();
    let err = bundler.write_to(&mut out).await.unwrap_err();
    match err {
        BlobpackError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_add_files_commits_in_call_order() {
    let temp_dir = project();
    let base = temp_dir.path();
    let names = ["e.txt", "d.txt", "c.txt", "b.txt", "a.txt"];
    for (i, name) in names.iter().enumerate() {
        fs::write(base.join(name), "x".repeat(i + 1)).unwrap();
    }

    let mut bundler = Bundler::new(base);
    let entries = bundler
        .add_files(names.iter().map(|name| base.join(name)))
        .await
        .unwrap();

    let mut expected_start = 0;
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.start, expected_start);
        assert_eq!(entry.length, i as u64 + 1);
        expected_start += entry.length;
    }

    let keys: Vec<String> = bundler.index().keys().map(str::to_string).collect();
    assert_eq!(keys, vec!["./e.txt", "./d.txt", "./c.txt", "./b.txt", "./a.txt"]);
    assert_eq!(drain(bundler).await.len() as u64, expected_start);
}

#[tokio::test]
async fn test_add_files_is_all_or_nothing() {
    let temp_dir = project();
    let base = temp_dir.path();
    fs::write(base.join("a.txt"), "a").unwrap();

    let mut bundler = Bundler::new(base);
    let result = bundler
        .add_files([base.join("a.txt"), base.join("missing.txt")])
        .await;

    assert!(result.is_err());
    assert!(bundler.is_empty());
    assert_eq!(bundler.blob_size(), 0);
}

#[tokio::test]
async fn test_concat_is_unsupported() {
    let mut bundler = Bundler::new("/proj");
    bundler.add_inline("/proj/a.txt", "a").await.unwrap();
    let err = bundler.concat().unwrap_err();
    assert!(matches!(err, BlobpackError::Unsupported { operation: "concat", .. }));
}

#[tokio::test]
async fn test_finish_returns_index_and_stream() {
    let mut bundler = Bundler::new("/proj");
    bundler.add_inline("/proj/one", "1").await.unwrap();
    bundler.add_inline("/proj/two", "22").await.unwrap();

    let (index, mut stream) = bundler.finish();
    assert_eq!(index.get("./two"), Some(IndexEntry::new(1, 2)));

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    for (key, entry) in index.iter() {
        let slice = &out[entry.start as usize..entry.end().unwrap() as usize];
        match key {
            "./one" => assert_eq!(slice, b"1"),
            "./two" => assert_eq!(slice, b"22"),
            other => panic!("unexpected key {other}"),
        }
    }
}

#[tokio::test]
async fn test_write_to_reports_length() {
    let mut bundler = Bundler::new("/proj");
    bundler.add_inline("/proj/a", "abc").await.unwrap();
    bundler.add_inline("/proj/b", "").await.unwrap();
    bundler.add_inline("/proj/c", "de").await.unwrap();

    let mut out = Vec::new();
    let written = bundler.write_to(&mut out).await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(out, b"abcde");
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::Config as ProptestConfig;

    fn resources_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
        prop::collection::vec(
            (
                "[a-z]{1,4}(/[a-z]{1,4}){0,2}\\.[a-z]{1,3}",
                prop::collection::vec(any::<u8>(), 0..64),
            ),
            0..12,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        /// Offsets are prefix sums of registration lengths and the drained
        /// blob holds every registration's bytes at its range.
        #[test]
        fn offsets_are_prefix_sums(resources in resources_strategy()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let mut bundler = Bundler::new("/proj");
                let mut ranges = Vec::new();
                let mut cursor = 0u64;
                for (path, content) in &resources {
                    let entry = bundler
                        .add_inline(format!("/proj/{}", path), content.clone())
                        .await
                        .unwrap();
                    prop_assert_eq!(entry.start, cursor);
                    prop_assert_eq!(entry.length, content.len() as u64);
                    cursor += entry.length;
                    ranges.push(entry);
                }
                prop_assert_eq!(bundler.blob_size(), cursor);

                // last write wins for repeated keys
                let index = bundler.index();
                for (path, _) in &resources {
                    let last = resources
                        .iter()
                        .zip(&ranges)
                        .filter(|((p, _), _)| p == path)
                        .map(|(_, range)| *range)
                        .last();
                    prop_assert_eq!(index.get(&format!("./{}", path)), last);
                }

                let blob = drain(bundler).await;
                prop_assert_eq!(blob.len() as u64, cursor);
                for ((_, content), entry) in resources.iter().zip(&ranges) {
                    let slice = &blob[entry.start as usize..entry.end().unwrap() as usize];
                    prop_assert_eq!(slice, content.as_slice());
                }
                Ok(())
            })?;
        }
    }
}
