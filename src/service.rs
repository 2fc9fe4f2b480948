//! Runtime access to compiled content.
//!
//! [`ContentStore`] is the immutable store built once from a [`CompiledContent`] artifact and
//! shared (`Arc`) with whatever needs content. [`ContentService`] wraps it with the
//! initialize-then-read contract: every getter fails with [`ContentError::NotInitialized`] until
//! [`ContentService::initialize`] has run, and re-initializing replaces the store wholesale.
//!
//! Parsed YAML values are handed out as `Arc<Value>` and shared between callers; treat them as
//! read-only.
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::{collections::HashMap, ops::Bound, sync::Arc};

use crate::{
    compiler::{CompiledContent, CompiledEntry, CompiledStats, EntryKind},
    config::{AssetConfig, Deployment},
    error::ContentError,
};

/// Maps logical paths to servable URLs for a deployment target. Pure; no I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetUrls {
    config: AssetConfig,
}

impl AssetUrls {
    pub fn new(config: AssetConfig) -> Self {
        Self { config }
    }

    pub fn base_path(&self, deployment: Deployment) -> &str {
        match deployment {
            Deployment::Development => &self.config.dev_base_path,
            Deployment::Production => &self.config.prod_base_path,
        }
    }

    pub fn url_for(&self, path: &str, deployment: Deployment) -> String {
        let base = self.base_path(deployment).trim_end_matches('/');
        let mut path = path;
        loop {
            let trimmed = path.trim_start_matches('/');
            let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
            if trimmed == path {
                break;
            }
            path = trimmed;
        }
        format!("{base}/{path}")
    }
}

/// Anything that can hand out parsed YAML by logical path, possibly asynchronously.
#[async_trait]
pub trait YamlSource: Send + Sync {
    async fn fetch_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError>;
}

/// Immutable compiled content plus a cache of parsed YAML values.
#[derive(Debug, Default)]
pub struct ContentStore {
    content: CompiledContent,
    yaml_cache: RwLock<HashMap<String, Arc<Value>>>,
}

impl From<CompiledContent> for ContentStore {
    fn from(content: CompiledContent) -> Self {
        ContentStore::new(content)
    }
}

impl ContentStore {
    pub fn new(content: CompiledContent) -> Self {
        tracing::debug!("ContentStore holds {} entries", content.len());
        Self {
            content,
            yaml_cache: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, path: &str) -> Result<&CompiledEntry, ContentError> {
        self.content
            .get(path)
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.content.entries.contains_key(path)
    }

    pub fn kind(&self, path: &str) -> Result<EntryKind, ContentError> {
        Ok(self.entry(path)?.kind)
    }

    pub fn stats(&self) -> &CompiledStats {
        &self.content.stats
    }

    /// All logical paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.content.entries.keys().map(String::as_str)
    }

    /// Logical paths under a directory prefix, sorted.
    pub fn paths_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.content
            .entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(path, _)| path.as_str())
            .take_while(move |path| path.starts_with(prefix))
    }

    /// Raw text of a markdown or YAML entry.
    pub fn get_raw(&self, path: &str) -> Result<&str, ContentError> {
        let entry = self.entry(path)?;
        if entry.kind == EntryKind::Opaque {
            return Err(ContentError::KindMismatch {
                path: path.to_string(),
                expected: "markdown or yaml".to_string(),
                found: entry.kind.to_string(),
            });
        }
        Ok(&entry.raw_text)
    }

    /// Parsed YAML of a YAML entry. Values embedded at compile time are served directly; entries
    /// compiled without them are parsed on first access. Either way the value is cached and the
    /// same `Arc` is returned on later calls.
    pub fn get_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        if let Some(cached) = self.yaml_cache.read().get(path) {
            return Ok(cached.clone());
        }
        let entry = self.entry(path)?;
        if entry.kind != EntryKind::Yaml {
            return Err(ContentError::KindMismatch {
                path: path.to_string(),
                expected: EntryKind::Yaml.to_string(),
                found: entry.kind.to_string(),
            });
        }
        let value = match &entry.parsed {
            Some(parsed) => parsed.clone(),
            None => {
                tracing::debug!("parsing deferred yaml {path}");
                serde_yaml::from_str::<Value>(&entry.raw_text)
                    .map_err(|e| ContentError::parse(path, e))?
            }
        };
        let mut cache = self.yaml_cache.write();
        // Another reader may have won the race; keep its value so the Arc stays shared.
        let value = cache
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(value))
            .clone();
        Ok(value)
    }

    /// Front-matter of a markdown entry, `None` if the page has none.
    pub fn get_frontmatter(&self, path: &str) -> Result<Option<&Value>, ContentError> {
        let entry = self.entry(path)?;
        if entry.kind != EntryKind::Markdown {
            return Err(ContentError::KindMismatch {
                path: path.to_string(),
                expected: EntryKind::Markdown.to_string(),
                found: entry.kind.to_string(),
            });
        }
        Ok(entry.frontmatter.as_ref())
    }
}

#[async_trait]
impl YamlSource for ContentStore {
    async fn fetch_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        self.get_yaml(path)
    }
}

/// Initialize-once facade over a [`ContentStore`].
///
/// Initialization is expected to complete before readers are spawned; the lock only keeps a
/// concurrent re-initialization memory safe, it does not order it against readers.
#[derive(Debug, Default)]
pub struct ContentService {
    store: RwLock<Option<Arc<ContentStore>>>,
    assets: AssetUrls,
}

impl ContentService {
    pub fn new(assets: AssetConfig) -> Self {
        Self {
            store: RwLock::new(None),
            assets: AssetUrls::new(assets),
        }
    }

    /// Install compiled content, replacing (and dropping the cache of) any earlier content.
    pub fn initialize(&self, content: CompiledContent) {
        let store = Arc::new(ContentStore::new(content));
        let replaced = self.store.write().replace(store).is_some();
        if replaced {
            tracing::info!("ContentService re-initialized; previous content replaced");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.store.read().is_some()
    }

    /// The current store. Cloning the `Arc` lets callers keep reading a consistent snapshot
    /// across a later re-initialization.
    pub fn store(&self) -> Result<Arc<ContentStore>, ContentError> {
        self.store
            .read()
            .as_ref()
            .cloned()
            .ok_or(ContentError::NotInitialized)
    }

    pub fn get_raw(&self, path: &str) -> Result<String, ContentError> {
        Ok(self.store()?.get_raw(path)?.to_string())
    }

    pub fn get_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        self.store()?.get_yaml(path)
    }

    pub fn get_frontmatter(&self, path: &str) -> Result<Option<Value>, ContentError> {
        Ok(self.store()?.get_frontmatter(path)?.cloned())
    }

    pub fn contains(&self, path: &str) -> Result<bool, ContentError> {
        Ok(self.store()?.contains(path))
    }

    pub fn kind(&self, path: &str) -> Result<EntryKind, ContentError> {
        self.store()?.kind(path)
    }

    pub fn paths(&self) -> Result<Vec<String>, ContentError> {
        Ok(self.store()?.paths().map(str::to_string).collect())
    }

    pub fn paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>, ContentError> {
        Ok(self
            .store()?
            .paths_with_prefix(prefix)
            .map(str::to_string)
            .collect())
    }

    pub fn stats(&self) -> Result<CompiledStats, ContentError> {
        Ok(self.store()?.stats().clone())
    }

    pub fn asset_url(&self, path: &str, deployment: Deployment) -> Result<String, ContentError> {
        if !self.is_initialized() {
            return Err(ContentError::NotInitialized);
        }
        Ok(self.assets.url_for(path, deployment))
    }
}

#[async_trait]
impl YamlSource for ContentService {
    async fn fetch_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        self.get_yaml(path)
    }
}

#[async_trait]
impl<S: YamlSource + ?Sized> YamlSource for Arc<S> {
    async fn fetch_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        (**self).fetch_yaml(path).await
    }
}
