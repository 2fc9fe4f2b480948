//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// The checked-in fixture textbook. Read-only; copy it before mutating anything.
#[allow(dead_code)]
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/textbook_1")
}

/// Copy the fixture textbook into `temp_dir`, returning the new content root
/// (`<temp_dir>/content/`).
#[allow(dead_code)]
pub fn copy_fixture(temp_dir: &TempDir) -> PathBuf {
    let source = fixture_root();
    let dest = temp_dir.path().join("content");
    for entry in WalkDir::new(&source) {
        let entry = entry.unwrap();
        let target = dest.join(entry.path().strip_prefix(&source).unwrap());
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).unwrap();
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
    dest
}

/// The fixture's chapter concept maps, in chapter order.
#[allow(dead_code)]
pub const FIXTURE_CONCEPT_MAPS: [&str; 3] = [
    "chapter-01/concept-map.yml",
    "chapter-02/concept-map.yml",
    "chapter-03/concept-map.yml",
];
