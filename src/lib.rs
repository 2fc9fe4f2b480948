//! # textbook-core
//!
//! Content pipeline for an interactive textbook: a build-time compiler that snapshots a tree of
//! markdown and YAML into a single artifact, a runtime service that serves that artifact, and a
//! resolver that assembles practice-exam question sets from concept maps.
//!
//! ## Overview
//!
//! Authored content lives in a directory tree, conventionally one directory per chapter:
//!
//! ```text
//! content/
//!   chapter-01/
//!     index.md
//!     concept-map.yml
//!     questions/big-o-definition.yml
//!   chapter-02/
//!     ...
//! ```
//!
//! Every file is addressed by its **logical path**: its path relative to the content root, with
//! `/` separators and no leading slash (`chapter-01/concept-map.yml`). Logical paths are the only
//! keys the runtime ever sees.
//!
//! ## Architecture
//!
//! - **[`compiler`]**: Walks a [`compiler::SourceTree`] (the filesystem or an embedded
//!   `include_dir` tree) into [`compiler::CompiledContent`], parsing YAML and markdown
//!   front-matter up front so malformed content fails the build rather than the page.
//! - **[`service`]**: [`service::ContentService`] holds the compiled content after a one-time
//!   initialization and serves raw text, parsed YAML and front-matter by logical path, plus
//!   deployment-aware asset URLs.
//! - **[`resolver`]**: [`resolver::QuestionResolver`] turns concept maps into an ordered list of
//!   [`resolver::EnrichedQuestion`]s, skipping (and reporting) whatever cannot be loaded.
//! - **[`config`]**: `textbook.toml` configuration shared by all three.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use textbook_core::{
//!     compiler::ContentCompiler, resolver::QuestionResolver, service::ContentService,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let content = ContentCompiler::default().compile_path("./content")?;
//!
//!     let service = Arc::new(ContentService::default());
//!     service.initialize(content);
//!
//!     let resolver = QuestionResolver::new(service.clone());
//!     let questions = resolver
//!         .resolve_questions(&["chapter-01/concept-map.yml", "chapter-02/concept-map.yml"])
//!         .await;
//!     for question in questions {
//!         println!("{} ({})", question.id, question.chapter_title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: The library
//! - **bin**: The `textbook` command line tool (`compile`, `stats`, `questions`)

pub mod compiler;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod paths;
pub mod resolver;
pub mod service;
#[cfg(test)]
mod tests;

pub use error::*;
