//! Build-time content compilation.
//!
//! [`ContentCompiler`] snapshots every markdown and YAML file beneath a content root into a
//! [`CompiledContent`] artifact, so that nothing downstream touches a filesystem. Compilation
//! is all-or-nothing: a YAML file that fails to parse, an unreadable file or a non UTF-8 file
//! aborts the whole run with an error naming the offending path.
//!
//! ```rust,no_run
//! use textbook_core::{compiler::ContentCompiler, config::CompilerConfig};
//!
//! # fn main() -> Result<(), textbook_core::ContentError> {
//! let config = CompilerConfig::default();
//! let compiled = ContentCompiler::new(&config).compile_path(&config.root)?;
//! compiled.write_to(&config.output)?;
//! println!("{} files, {} bytes", compiled.stats.total_files, compiled.stats.total_bytes);
//! # Ok(())
//! # }
//! ```
use include_dir::{Dir, DirEntry as EmbeddedEntry};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, read},
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::{CompilerConfig, OpaquePolicy},
    error::ContentError,
    frontmatter::parse_frontmatter,
    paths::{extension, logical_path},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Markdown,
    Yaml,
    /// Any other file, recorded only under [`OpaquePolicy::PassThrough`].
    Opaque,
}

impl EntryKind {
    /// Classify by extension, case-insensitively. `None` for anything that is not markdown or
    /// YAML.
    pub fn from_path(path: &str) -> Option<EntryKind> {
        let ext = extension(path)?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(EntryKind::Markdown),
            "yml" | "yaml" => Some(EntryKind::Yaml),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Markdown => "markdown",
            EntryKind::Yaml => "yaml",
            EntryKind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file as listed by a [`SourceTree`]: its logical path and size. Content is read on demand
/// so ignored files are never loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub size: u64,
}

/// Somewhere content source files come from.
pub trait SourceTree {
    /// Human readable location, for logging.
    fn describe(&self) -> String;

    /// Every file in the tree, in any order.
    fn list(&self) -> Result<Vec<SourceFile>, ContentError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError>;
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// A content root on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsSourceTree {
    root: PathBuf,
    include_hidden: bool,
}

impl FsSourceTree {
    /// Fails with [`ContentError::NotFound`] if `root` is not an existing directory.
    pub fn new(root: impl AsRef<Path>, include_hidden: bool) -> Result<Self, ContentError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ContentError::NotFound(format!(
                "content root {root:?} is not a directory"
            )));
        }
        let root = root
            .canonicalize()
            .map_err(|e| ContentError::from_io(format!("{root:?}"), e))?;
        Ok(Self {
            root,
            include_hidden,
        })
    }
}

impl SourceTree for FsSourceTree {
    fn describe(&self) -> String {
        format!("{}", self.root.display())
    }

    fn list(&self) -> Result<Vec<SourceFile>, ContentError> {
        let include_hidden = self.include_hidden;
        let is_hidden = |entry: &DirEntry| {
            entry
                .file_name()
                .to_str()
                .map(is_hidden_name)
                .unwrap_or(false)
        };
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e))
        {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| format!("{}", p.display()))
                    .unwrap_or_else(|| self.describe());
                match e.into_io_error() {
                    Some(io_err) => ContentError::from_io(path, io_err),
                    None => ContentError::Io {
                        path,
                        message: "filesystem loop detected".to_string(),
                    },
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| ContentError::Io {
                    path: format!("{}", entry.path().display()),
                    message: format!("{e}"),
                })?
                .len();
            let path = logical_path(&self.root, entry.path())?;
            tracing::debug!("discovered {path} ({size} bytes)");
            files.push(SourceFile { path, size });
        }
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full_path = path
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        read(&full_path).map_err(|e| ContentError::from_io(path, e))
    }
}

/// A content root baked into the binary with [`include_dir::include_dir!`].
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSourceTree<'a> {
    dir: &'a Dir<'a>,
    include_hidden: bool,
}

impl<'a> EmbeddedSourceTree<'a> {
    pub fn new(dir: &'a Dir<'a>, include_hidden: bool) -> Self {
        Self {
            dir,
            include_hidden,
        }
    }

    /// Paths inside an `include_dir!` tree are relative to the macro's root, so a sub-`Dir`
    /// has its own path stripped to yield logical paths.
    fn visit(&self, dir: &'a Dir<'a>, files: &mut Vec<SourceFile>) -> Result<(), ContentError> {
        for entry in dir.entries() {
            let name_is_hidden = entry
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .map(is_hidden_name)
                .unwrap_or(false);
            if name_is_hidden && !self.include_hidden {
                continue;
            }
            match entry {
                EmbeddedEntry::Dir(sub) => self.visit(sub, files)?,
                EmbeddedEntry::File(file) => files.push(SourceFile {
                    path: logical_path(self.dir.path(), file.path())?,
                    size: file.contents().len() as u64,
                }),
            }
        }
        Ok(())
    }
}

impl SourceTree for EmbeddedSourceTree<'_> {
    fn describe(&self) -> String {
        format!("embedded:{}", self.dir.path().display())
    }

    fn list(&self) -> Result<Vec<SourceFile>, ContentError> {
        let mut files = Vec::new();
        self.visit(self.dir, &mut files)?;
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full_path = path
            .split('/')
            .fold(self.dir.path().to_path_buf(), |acc, segment| acc.join(segment));
        self.dir
            .get_file(&full_path)
            .map(|f| f.contents().to_vec())
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}

/// `Some(value)` even when the serialized value is `null`, so empty YAML documents survive an
/// artifact round trip.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One compiled source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledEntry {
    pub kind: EntryKind,
    /// Unmodified file text. Empty for opaque entries.
    #[serde(default)]
    pub raw_text: String,
    /// Parsed YAML document. Absent for markdown, for opaque entries, and for YAML when the
    /// artifact was compiled without embedded values.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub parsed: Option<Value>,
    /// Parsed YAML front-matter of a markdown page.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub frontmatter: Option<Value>,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledStats {
    pub files_by_kind: BTreeMap<EntryKind, usize>,
    pub bytes_by_kind: BTreeMap<EntryKind, u64>,
    pub total_files: usize,
    pub total_bytes: u64,
    /// Files skipped because their kind is unsupported.
    pub ignored: usize,
}

impl CompiledStats {
    pub fn record(&mut self, entry: &CompiledEntry) {
        *self.files_by_kind.entry(entry.kind).or_default() += 1;
        *self.bytes_by_kind.entry(entry.kind).or_default() += entry.bytes;
        self.total_files += 1;
        self.total_bytes += entry.bytes;
    }

    pub fn files_of(&self, kind: EntryKind) -> usize {
        self.files_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// The compiled content store artifact: logical path to entry, plus aggregate stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledContent {
    pub entries: BTreeMap<String, CompiledEntry>,
    pub stats: CompiledStats,
}

impl CompiledContent {
    pub fn get(&self, path: &str) -> Option<&CompiledEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, ContentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load an artifact from JSON text, e.g. one embedded with `include_str!`.
    pub fn from_json_str(json: &str) -> Result<Self, ContentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, ContentError> {
        let path = path.as_ref();
        tracing::debug!("Reading artifact {:?}", path);
        let text = fs::read_to_string(path)
            .map_err(|e| ContentError::from_io(format!("{}", path.display()), e))?;
        Self::from_json_str(&text)
    }

    /// Write the artifact as pretty JSON. The write goes through a temp file and a rename so a
    /// failed build never leaves a truncated artifact behind.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ContentError> {
        let path = path.as_ref();
        let shown = format!("{}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ContentError::from_io(&shown, e))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, self.to_json_pretty()?).map_err(|e| ContentError::from_io(&shown, e))?;
        fs::rename(&tmp, path).map_err(|e| ContentError::from_io(&shown, e))?;
        tracing::info!("Wrote {} entries to {}", self.len(), shown);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ContentCompiler {
    opaque: OpaquePolicy,
    embed_parsed: bool,
    include_hidden: bool,
}

impl Default for ContentCompiler {
    fn default() -> Self {
        Self::new(&CompilerConfig::default())
    }
}

impl ContentCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            opaque: config.opaque,
            embed_parsed: config.embed_parsed,
            include_hidden: config.include_hidden,
        }
    }

    /// Compile a content root on disk.
    pub fn compile_path(&self, root: impl AsRef<Path>) -> Result<CompiledContent, ContentError> {
        let tree = FsSourceTree::new(root, self.include_hidden)?;
        self.compile(&tree)
    }

    /// Compile a content root embedded in the binary.
    pub fn compile_embedded(&self, dir: &Dir<'_>) -> Result<CompiledContent, ContentError> {
        self.compile(&EmbeddedSourceTree::new(dir, self.include_hidden))
    }

    pub fn compile<T: SourceTree + ?Sized>(
        &self,
        tree: &T,
    ) -> Result<CompiledContent, ContentError> {
        let mut files = tree.list()?;
        // Enumeration order is not trusted; the entry map is keyed by path anyway.
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(dup) = files.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(ContentError::Config(format!(
                "{} lists '{}' more than once",
                tree.describe(),
                dup[0].path
            )));
        }

        let mut compiled = CompiledContent::default();
        for file in files {
            let Some(entry) = self.compile_file(tree, &file)? else {
                compiled.stats.ignored += 1;
                continue;
            };
            compiled.stats.record(&entry);
            compiled.entries.insert(file.path, entry);
        }

        tracing::info!(
            "Compiled {}: {} markdown, {} yaml, {} opaque, {} ignored, {} bytes",
            tree.describe(),
            compiled.stats.files_of(EntryKind::Markdown),
            compiled.stats.files_of(EntryKind::Yaml),
            compiled.stats.files_of(EntryKind::Opaque),
            compiled.stats.ignored,
            compiled.stats.total_bytes
        );
        Ok(compiled)
    }

    fn compile_file<T: SourceTree + ?Sized>(
        &self,
        tree: &T,
        file: &SourceFile,
    ) -> Result<Option<CompiledEntry>, ContentError> {
        let kind = match EntryKind::from_path(&file.path) {
            Some(kind @ (EntryKind::Markdown | EntryKind::Yaml)) => kind,
            _ => {
                return Ok(match self.opaque {
                    OpaquePolicy::Ignore => {
                        tracing::debug!("ignoring {}", file.path);
                        None
                    }
                    OpaquePolicy::PassThrough => Some(CompiledEntry {
                        kind: EntryKind::Opaque,
                        raw_text: String::new(),
                        parsed: None,
                        frontmatter: None,
                        bytes: file.size,
                    }),
                });
            }
        };

        let bytes = tree.read(&file.path)?;
        let byte_len = bytes.len() as u64;
        let raw_text =
            String::from_utf8(bytes).map_err(|_| ContentError::Encoding(file.path.clone()))?;

        let (parsed, frontmatter) = if kind == EntryKind::Yaml {
            let parsed: Value = serde_yaml::from_str(&raw_text)
                .map_err(|e| ContentError::parse(&file.path, e))?;
            (self.embed_parsed.then_some(parsed), None)
        } else {
            match parse_frontmatter(&file.path, &raw_text) {
                Ok(fm) => (None, fm),
                Err(e) => {
                    tracing::warn!("ignoring front-matter: {e}");
                    (None, None)
                }
            }
        };
        Ok(Some(CompiledEntry {
            kind,
            raw_text,
            parsed,
            frontmatter,
            bytes: byte_len,
        }))
    }
}
