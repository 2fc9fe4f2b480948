//! Practice-exam question resolution.
//!
//! A concept map is a YAML document shaped like
//!
//! ```yaml
//! concept_map:
//!   - category: Asymptotics
//!     concepts:
//!       - name: Big-O
//!         exam_questions:
//!           - big-o-definition.yml
//!           - questions/growth-rates.yml
//! ```
//!
//! [`QuestionResolver`] walks a list of concept maps, loads every question file they reference
//! (relative to the concept map's own directory), tags each question with chapter metadata and a
//! synthetic id, and returns the lot ordered by chapter then question file.
//!
//! Resolution is best effort. A concept map that cannot be loaded or has the wrong shape drops
//! only that map's questions; a question file that cannot be loaded drops only that question.
//! Every such failure is logged and reported in [`Resolution::failures`], never returned as an
//! error.
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashSet, fmt, sync::Arc, time::Duration};
use tokio::time::timeout;

use crate::{
    config::ResolverConfig,
    error::ContentError,
    paths::{file_name, file_stem, parent_dir, resolve_sibling},
    service::YamlSource,
};

/// Title given to questions whose concept map path carries no `chapter-N` segment.
pub const FALLBACK_CHAPTER_TITLE: &str = "General";

/// Keys the resolver writes onto every question. Same-named source fields are dropped.
const RESERVED_KEYS: [&str; 5] = ["id", "chapter", "chapterTitle", "conceptMapPath", "questionFile"];

static CHAPTER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"chapter-(\d+)").expect("chapter pattern is a valid regex"));

/// Chapter number and display title derived from a concept map path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterInfo {
    pub number: u64,
    pub title: String,
}

impl ChapterInfo {
    /// First integer after the literal `chapter-` in `path`; chapter 0 with the fallback title
    /// when there is none. Numbers too large for a `u64` saturate.
    pub fn from_path(path: &str) -> Self {
        CHAPTER_PATTERN
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|digits| digits.as_str().parse::<u64>().unwrap_or(u64::MAX))
            .map(|number| ChapterInfo {
                number,
                title: format!("Chapter {number}"),
            })
            .unwrap_or_else(|| ChapterInfo {
                number: 0,
                title: FALLBACK_CHAPTER_TITLE.to_string(),
            })
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptMap {
    pub concept_map: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "null_as_default")]
    pub concepts: Vec<Concept>,
    /// Names, descriptions and anything else the presentation layer reads.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Question file references. Kept as raw values so one malformed item only fails itself.
    #[serde(default, deserialize_with = "null_as_default")]
    pub exam_questions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConceptMap {
    pub fn from_value(path: &str, value: &Value) -> Result<Self, ContentError> {
        let Some(object) = value.as_object() else {
            return Err(ContentError::shape(path, "expected a mapping at the top level"));
        };
        match object.get("concept_map") {
            None => Err(ContentError::shape(path, "missing `concept_map`")),
            Some(Value::Array(_)) => {
                ConceptMap::deserialize(value).map_err(|e| ContentError::shape(path, e.to_string()))
            }
            Some(_) => Err(ContentError::shape(path, "`concept_map` is not a sequence")),
        }
    }

    /// Every question reference in document order, duplicates and malformed items included.
    pub fn references(&self) -> impl Iterator<Item = &Value> {
        self.concept_map
            .iter()
            .flat_map(|category| category.concepts.iter())
            .flat_map(|concept| concept.exam_questions.iter())
    }
}

/// A question file's contents. Only a handful of fields are interpreted; everything else
/// (grade-band answers, vocabulary, topics, ...) is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionDocument(pub Map<String, Value>);

impl QuestionDocument {
    pub fn from_value(path: &str, value: &Value) -> Result<Self, ContentError> {
        match value {
            Value::Object(map) => Ok(QuestionDocument(map.clone())),
            _ => Err(ContentError::shape(path, "question document is not a mapping")),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn question_type(&self) -> Option<&str> {
        self.field("type").and_then(Value::as_str)
    }

    pub fn question(&self) -> Option<&str> {
        self.field("question").and_then(Value::as_str)
    }

    pub fn answer(&self) -> Option<&str> {
        self.field("answer").and_then(Value::as_str)
    }
}

/// A question as handed to the exam UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedQuestion {
    /// `ch{chapter}-{question file stem}`; any `id` in the source file is discarded.
    pub id: String,
    pub chapter: u64,
    pub chapter_title: String,
    pub concept_map_path: String,
    /// Question file path relative to the concept map's directory.
    pub question_file: String,
    #[serde(flatten)]
    pub document: QuestionDocument,
}

impl EnrichedQuestion {
    pub fn new(
        mut document: QuestionDocument,
        chapter: &ChapterInfo,
        concept_map_path: &str,
        question_path: &str,
    ) -> Self {
        for key in RESERVED_KEYS {
            document.0.remove(key);
        }
        let dir = parent_dir(concept_map_path);
        let question_file = if dir.is_empty() {
            question_path.to_string()
        } else {
            question_path
                .strip_prefix(dir)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(question_path)
                .to_string()
        };
        EnrichedQuestion {
            id: format!("ch{}-{}", chapter.number, file_stem(question_path)),
            chapter: chapter.number,
            chapter_title: chapter.title.clone(),
            concept_map_path: concept_map_path.to_string(),
            question_file,
            document,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.document.field(name)
    }

    pub fn question_type(&self) -> Option<&str> {
        self.document.question_type()
    }

    pub fn question(&self) -> Option<&str> {
        self.document.question()
    }

    pub fn answer(&self) -> Option<&str> {
        self.document.answer()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureScope {
    /// The whole concept map was skipped.
    ConceptMap,
    /// A single question was skipped.
    Question,
}

impl fmt::Display for FailureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureScope::ConceptMap => write!(f, "concept map"),
            FailureScope::Question => write!(f, "question"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFailure {
    pub scope: FailureScope,
    pub concept_map_path: String,
    /// The concept map, or the question reference that failed.
    pub path: String,
    pub error: ContentError,
}

/// Outcome of a resolution pass: the questions plus whatever had to be skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub questions: Vec<EnrichedQuestion>,
    pub failures: Vec<ResolveFailure>,
}

impl Resolution {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_questions(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.scope == FailureScope::Question)
            .count()
    }

    pub fn failed_concept_maps(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.scope == FailureScope::ConceptMap)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct MapOutcome {
    questions: Vec<EnrichedQuestion>,
    failures: Vec<ResolveFailure>,
}

impl MapOutcome {
    fn fail(&mut self, scope: FailureScope, concept_map_path: &str, path: &str, error: ContentError) {
        tracing::warn!("skipping {scope} '{path}' (from {concept_map_path}): {error}");
        self.failures.push(ResolveFailure {
            scope,
            concept_map_path: concept_map_path.to_string(),
            path: path.to_string(),
            error,
        });
    }
}

/// Assembles the ordered practice-exam question set from concept maps.
///
/// Fetches run concurrently and each is bounded by the fetch timeout, which relies on a tokio
/// runtime with the time driver enabled.
#[derive(Debug, Clone)]
pub struct QuestionResolver<S> {
    source: S,
    fetch_timeout: Duration,
}

impl<S: YamlSource> QuestionResolver<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, &ResolverConfig::default())
    }

    pub fn with_config(source: S, config: &ResolverConfig) -> Self {
        Self {
            source,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn with_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve `concept_maps` into the ordered question set, dropping failures silently (they
    /// are still logged). See [`QuestionResolver::resolve_with_report`].
    pub async fn resolve_questions<P: AsRef<str>>(&self, concept_maps: &[P]) -> Vec<EnrichedQuestion> {
        self.resolve_with_report(concept_maps).await.questions
    }

    /// Resolve `concept_maps`, returning the questions together with every skipped concept map
    /// and question.
    ///
    /// Questions are ordered by chapter, then question file name, with the relative question
    /// file path and the concept map path as tiebreaks. Input order does not matter, and a
    /// concept map listed twice is only resolved once.
    pub async fn resolve_with_report<P: AsRef<str>>(&self, concept_maps: &[P]) -> Resolution {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = concept_maps
            .iter()
            .map(AsRef::as_ref)
            .filter(|path| seen.insert(*path))
            .collect();

        let outcomes = join_all(unique.iter().map(|path| self.resolve_map(path))).await;

        let mut resolution = Resolution::default();
        for outcome in outcomes {
            resolution.questions.extend(outcome.questions);
            resolution.failures.extend(outcome.failures);
        }
        resolution.questions.sort_by(|a, b| {
            a.chapter
                .cmp(&b.chapter)
                .then_with(|| file_name(&a.question_file).cmp(file_name(&b.question_file)))
                .then_with(|| a.question_file.cmp(&b.question_file))
                .then_with(|| a.concept_map_path.cmp(&b.concept_map_path))
        });

        tracing::info!(
            "Resolved {} questions from {} concept maps ({} maps skipped, {} questions skipped)",
            resolution.questions.len(),
            unique.len(),
            resolution.failed_concept_maps(),
            resolution.failed_questions()
        );
        resolution
    }

    async fn fetch(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        match timeout(self.fetch_timeout, self.source.fetch_yaml(path)).await {
            Ok(result) => result,
            Err(_) => Err(ContentError::Timeout {
                path: path.to_string(),
                after_ms: self.fetch_timeout.as_millis() as u64,
            }),
        }
    }

    async fn resolve_map(&self, map_path: &str) -> MapOutcome {
        let mut outcome = MapOutcome::default();

        let concept_map = match self
            .fetch(map_path)
            .await
            .and_then(|value| ConceptMap::from_value(map_path, &value))
        {
            Ok(concept_map) => concept_map,
            Err(e) => {
                outcome.fail(FailureScope::ConceptMap, map_path, map_path, e);
                return outcome;
            }
        };

        let chapter = ChapterInfo::from_path(map_path);

        // Questions are identified by file name within a map; the first reference wins.
        let mut seen = HashSet::new();
        let mut question_paths = Vec::new();
        for item in concept_map.references() {
            let Some(reference) = item.as_str() else {
                outcome.fail(
                    FailureScope::Question,
                    map_path,
                    &item.to_string(),
                    ContentError::shape(
                        map_path,
                        format!("question reference {item} is not a string"),
                    ),
                );
                continue;
            };
            if reference.trim().is_empty() {
                outcome.fail(
                    FailureScope::Question,
                    map_path,
                    reference,
                    ContentError::shape(map_path, "empty question reference"),
                );
                continue;
            }
            match resolve_sibling(map_path, reference) {
                Some(resolved) => {
                    if seen.insert(file_name(&resolved).to_string()) {
                        question_paths.push(resolved);
                    } else {
                        tracing::debug!("{map_path}: '{reference}' repeats an earlier file name");
                    }
                }
                None => outcome.fail(
                    FailureScope::Question,
                    map_path,
                    reference,
                    ContentError::shape(
                        map_path,
                        format!("question reference '{reference}' escapes the content root"),
                    ),
                ),
            }
        }
        tracing::debug!(
            "{map_path}: chapter {}, {} unique question files",
            chapter.number,
            question_paths.len()
        );

        let fetched = join_all(question_paths.iter().map(|path| self.fetch(path))).await;
        for (question_path, result) in question_paths.iter().zip(fetched) {
            match result.and_then(|value| QuestionDocument::from_value(question_path, &value)) {
                Ok(document) => outcome.questions.push(EnrichedQuestion::new(
                    document,
                    &chapter,
                    map_path,
                    question_path,
                )),
                Err(e) => outcome.fail(FailureScope::Question, map_path, question_path, e),
            }
        }
        outcome
    }
}
