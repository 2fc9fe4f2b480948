//! Shared test utilities for the content pipeline

use crate::{
    compiler::{CompiledContent, ContentCompiler, SourceFile, SourceTree},
    error::ContentError,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// In-memory source tree keyed by logical path.
pub struct MemoryTree(pub Vec<(String, String)>);

impl SourceTree for MemoryTree {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn list(&self) -> Result<Vec<SourceFile>, ContentError> {
        Ok(self
            .0
            .iter()
            .map(|(path, text)| SourceFile {
                path: path.clone(),
                size: text.len() as u64,
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        self.0
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, text)| text.as_bytes().to_vec())
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}

/// Compile `(logical path, text)` pairs with the default compiler.
pub fn compiled_from(files: &[(&str, &str)]) -> CompiledContent {
    let tree = MemoryTree(
        files
            .iter()
            .map(|(path, text)| (path.to_string(), text.to_string()))
            .collect(),
    );
    ContentCompiler::default()
        .compile(&tree)
        .expect("test fixture compiles")
}
