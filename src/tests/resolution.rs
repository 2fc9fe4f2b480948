use crate::{
    compiler::CompiledContent,
    error::ContentError,
    resolver::{FailureScope, QuestionResolver, FALLBACK_CHAPTER_TITLE},
    service::{ContentService, ContentStore, YamlSource},
    tests::helpers::{compiled_from, init_logging},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use test_log::test;

fn textbook() -> CompiledContent {
    compiled_from(&[
        (
            "chapter-02/concept-map.yml",
            r#"
concept_map:
  - category: Recursion
    concepts:
      - name: Base cases
        exam_questions:
          - questions/base-case.yml
          - questions/missing.yml
      - name: Call stack
        exam_questions:
          - questions/base-case.yml
          - ../shared/stack-frames.yml
"#,
        ),
        (
            "chapter-02/questions/base-case.yml",
            "id: 3\ntype: conceptual\nquestion: What is a base case?\nanswer: The non-recursive branch.\n",
        ),
        (
            "shared/stack-frames.yml",
            "type: trace\nquestion: Draw the frames.\nanswer: See figure.\n",
        ),
        (
            "chapter-01/concept-map.yml",
            r#"
concept_map:
  - category: Asymptotics
    concepts:
      - name: Big-O
        exam_questions: [big-o.yml, "", ../../outside.yml]
"#,
        ),
        (
            "chapter-01/big-o.yml",
            "type: conceptual\nquestion: Define Big-O.\nanswer: Upper bound.\n",
        ),
        (
            "appendix/concept-map.yml",
            "concept_map:\n  - concepts:\n      - exam_questions: [glossary.yml]\n",
        ),
        ("appendix/glossary.yml", "question: Define invariant.\n"),
        ("chapter-03/concept-map.yml", "title: not a concept map\n"),
        ("chapter-04/concept-map.yml", "concept_map:\n  - concepts:\n      - exam_questions: [list.yml]\n"),
        ("chapter-04/list.yml", "- not\n- a\n- mapping\n"),
    ])
}

fn service() -> Arc<ContentService> {
    let service = ContentService::default();
    service.initialize(textbook());
    Arc::new(service)
}

#[test(tokio::test)]
async fn questions_are_enriched_and_ordered() {
    let resolver = QuestionResolver::new(service());
    let questions = resolver
        .resolve_questions(&[
            "appendix/concept-map.yml",
            "chapter-02/concept-map.yml",
            "chapter-01/concept-map.yml",
        ])
        .await;

    let ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["ch0-glossary", "ch1-big-o", "ch2-base-case", "ch2-stack-frames"]
    );

    assert_eq!(questions[0].chapter_title, FALLBACK_CHAPTER_TITLE);
    assert_eq!(questions[1].chapter_title, "Chapter 1");
    assert_eq!(questions[2].question_file, "questions/base-case.yml");
    assert_eq!(questions[2].concept_map_path, "chapter-02/concept-map.yml");
    assert_eq!(questions[2].answer(), Some("The non-recursive branch."));
    assert_eq!(questions[2].question_type(), Some("conceptual"));
    // Outside the concept map's directory the question file stays root-relative.
    assert_eq!(questions[3].question_file, "shared/stack-frames.yml");
}

#[test(tokio::test)]
async fn failures_are_isolated_and_reported() {
    init_logging();
    let resolver = QuestionResolver::new(service());
    let resolution = resolver
        .resolve_with_report(&[
            "chapter-01/concept-map.yml",
            "chapter-02/concept-map.yml",
            "chapter-03/concept-map.yml",
            "chapter-04/concept-map.yml",
            "chapter-09/concept-map.yml",
        ])
        .await;

    assert_eq!(resolution.questions.len(), 3);
    assert_eq!(resolution.failed_concept_maps(), 2);
    assert_eq!(resolution.failed_questions(), 4);

    let failure = |path: &str| {
        resolution
            .failures
            .iter()
            .find(|f| f.path == path)
            .unwrap_or_else(|| panic!("no failure recorded for {path}"))
    };
    assert!(matches!(
        failure("chapter-03/concept-map.yml").error,
        ContentError::Shape { .. }
    ));
    assert!(matches!(
        failure("chapter-09/concept-map.yml").error,
        ContentError::NotFound(_)
    ));
    assert_eq!(failure("chapter-09/concept-map.yml").scope, FailureScope::ConceptMap);
    assert!(matches!(
        failure("chapter-02/questions/missing.yml").error,
        ContentError::NotFound(_)
    ));
    assert!(matches!(failure("").error, ContentError::Shape { .. }));
    assert!(matches!(
        failure("../../outside.yml").error,
        ContentError::Shape { .. }
    ));
    assert!(matches!(
        failure("chapter-04/list.yml").error,
        ContentError::Shape { .. }
    ));
}

#[test(tokio::test)]
async fn repeated_inputs_and_references_resolve_once() {
    let resolver = QuestionResolver::new(service());
    let questions = resolver
        .resolve_questions(&["chapter-02/concept-map.yml", "chapter-02/concept-map.yml"])
        .await;
    assert_eq!(questions.len(), 2);
}

#[test(tokio::test)]
async fn resolution_is_order_independent() {
    let resolver = QuestionResolver::new(service());
    let forward = resolver
        .resolve_questions(&["chapter-01/concept-map.yml", "chapter-02/concept-map.yml"])
        .await;
    let backward = resolver
        .resolve_questions(&["chapter-02/concept-map.yml", "chapter-01/concept-map.yml"])
        .await;
    assert_eq!(forward, backward);
}

#[test(tokio::test)]
async fn empty_input_yields_nothing() {
    let resolver = QuestionResolver::new(service());
    let resolution = resolver.resolve_with_report::<&str>(&[]).await;
    assert!(resolution.questions.is_empty());
    assert!(resolution.is_complete());
}

#[test(tokio::test)]
async fn uninitialized_service_fails_every_map() {
    let resolver = QuestionResolver::new(Arc::new(ContentService::default()));
    let resolution = resolver
        .resolve_with_report(&["chapter-01/concept-map.yml"])
        .await;
    assert!(resolution.questions.is_empty());
    assert_eq!(resolution.failures[0].error, ContentError::NotInitialized);
}

/// Delays every fetch of a path containing `slow` and counts fetches.
struct SlowSource {
    store: ContentStore,
    delay: Duration,
    fetches: AtomicUsize,
}

#[async_trait]
impl YamlSource for SlowSource {
    async fn fetch_yaml(&self, path: &str) -> Result<Arc<Value>, ContentError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if path.contains("slow") {
            tokio::time::sleep(self.delay).await;
        }
        self.store.get_yaml(path)
    }
}

#[test(tokio::test)]
async fn slow_fetches_time_out() {
    let source = SlowSource {
        store: ContentStore::new(compiled_from(&[
            (
                "chapter-05/concept-map.yml",
                "concept_map:\n  - concepts:\n      - exam_questions: [fast.yml, slow.yml]\n",
            ),
            ("chapter-05/fast.yml", "question: quick\n"),
            ("chapter-05/slow.yml", "question: sluggish\n"),
        ])),
        delay: Duration::from_secs(10),
        fetches: AtomicUsize::new(0),
    };
    let resolver = QuestionResolver::new(Arc::new(source)).with_timeout(Duration::from_millis(50));
    let resolution = resolver
        .resolve_with_report(&["chapter-05/concept-map.yml"])
        .await;

    assert_eq!(resolution.questions.len(), 1);
    assert_eq!(resolution.questions[0].field("question"), Some(&json!("quick")));
    assert_eq!(
        resolution.failures[0].error,
        ContentError::Timeout {
            path: "chapter-05/slow.yml".to_string(),
            after_ms: 50
        }
    );
    assert_eq!(resolver.source().fetches.load(Ordering::SeqCst), 3);
}

#[test(tokio::test)]
async fn malformed_map_yaml_skips_only_that_map() {
    let mut content = compiled_from(&[
        (
            "chapter-01/concept-map.yml",
            "concept_map:\n  - concepts:\n      - exam_questions: [a.yml]\n",
        ),
        ("chapter-01/a.yml", "question: kept\n"),
        ("chapter-02/concept-map.yml", "concept_map: []\n"),
    ]);
    // Served without embedded values, so the bad text is only seen at fetch time.
    for entry in content.entries.values_mut() {
        entry.parsed = None;
    }
    content
        .entries
        .get_mut("chapter-02/concept-map.yml")
        .unwrap()
        .raw_text = "concept_map: [unclosed\n".to_string();
    let resolver = QuestionResolver::new(ContentStore::new(content));

    let resolution = resolver
        .resolve_with_report(&["chapter-02/concept-map.yml", "chapter-01/concept-map.yml"])
        .await;
    assert_eq!(resolution.questions.len(), 1);
    assert_eq!(resolution.questions[0].id, "ch1-a");
    assert!(matches!(
        resolution.failures[0].error,
        ContentError::Parse { .. }
    ));
}

#[test(tokio::test)]
async fn output_is_ordered_by_chapter_then_file() {
    let map = "concept_map:\n  - concepts:\n      - exam_questions: [b.yml, a.yml]\n";
    let resolver = QuestionResolver::new(ContentStore::new(compiled_from(&[
        ("chapter-2/concept-map.yml", map),
        ("chapter-2/a.yml", "question: 2a\n"),
        ("chapter-2/b.yml", "question: 2b\n"),
        ("chapter-1/concept-map.yml", map),
        ("chapter-1/a.yml", "question: 1a\n"),
        ("chapter-1/b.yml", "question: 1b\n"),
    ])));
    let questions = resolver
        .resolve_questions(&["chapter-2/concept-map.yml", "chapter-1/concept-map.yml"])
        .await;
    let order: Vec<&str> = questions.iter().filter_map(|q| q.question()).collect();
    assert_eq!(order, vec!["1a", "1b", "2a", "2b"]);
}

#[test(tokio::test)]
async fn same_file_name_in_two_directories_resolves_once() {
    let resolver = QuestionResolver::new(ContentStore::new(compiled_from(&[
        (
            "chapter-1/concept-map.yml",
            "concept_map:\n  - concepts:\n      - exam_questions: [a.yml]\n      - exam_questions: [questions/a.yml]\n",
        ),
        ("chapter-1/a.yml", "question: top level\n"),
        ("chapter-1/questions/a.yml", "question: nested\n"),
    ])));
    let questions = resolver
        .resolve_questions(&["chapter-1/concept-map.yml"])
        .await;
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].id, "ch1-a");
    assert_eq!(questions[0].question_file, "a.yml");
    assert_eq!(questions[0].question(), Some("top level"));
}

#[test(tokio::test)]
async fn file_name_orders_before_directory_prefix() {
    let resolver = QuestionResolver::new(ContentStore::new(compiled_from(&[
        (
            "chapter-1/concept-map.yml",
            "concept_map:\n  - concepts:\n      - exam_questions: [b.yml, questions/a.yml]\n",
        ),
        ("chapter-1/b.yml", "question: b\n"),
        ("chapter-1/questions/a.yml", "question: a\n"),
    ])));
    let questions = resolver
        .resolve_questions(&["chapter-1/concept-map.yml"])
        .await;
    let order: Vec<&str> = questions.iter().map(|q| q.question_file.as_str()).collect();
    assert_eq!(order, vec!["questions/a.yml", "b.yml"]);
}

#[test(tokio::test)]
async fn dangling_list_item_fails_only_itself() {
    let resolver = QuestionResolver::new(ContentStore::new(compiled_from(&[
        (
            "chapter-3/concept-map.yml",
            "concept_map:\n  - concepts:\n      - exam_questions:\n          - good.yml\n          -\n          - 7\n",
        ),
        ("chapter-3/good.yml", "question: still here\n"),
    ])));
    let resolution = resolver
        .resolve_with_report(&["chapter-3/concept-map.yml"])
        .await;

    assert_eq!(resolution.questions.len(), 1);
    assert_eq!(resolution.questions[0].id, "ch3-good");
    assert_eq!(resolution.failed_concept_maps(), 0);
    assert_eq!(resolution.failed_questions(), 2);
    assert!(resolution
        .failures
        .iter()
        .all(|f| matches!(f.error, ContentError::Shape { .. })));
    let paths: Vec<&str> = resolution.failures.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["null", "7"]);
}
