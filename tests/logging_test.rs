//! Integration tests for conversion events emitted by the router.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use topdf::{Config, ErrorKind, MemoryEventSink, MemorySink, Options, Phase, Router};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn router(config: Config) -> (Router, Arc<MemoryEventSink>) {
    let events = Arc::new(MemoryEventSink::new());
    let router = Router::new(config)
        .unwrap()
        .with_sink(Arc::new(MemorySink::new()))
        .with_event_sink(events.clone());
    (router, events)
}

#[test]
fn test_success_sequence() {
    let (router, events) = router(Config::default());
    router
        .convert_text("Hello", Some(Path::new("out/hello.pdf")), &Options::new())
        .unwrap();

    let recorded = events.events();
    assert_eq!(events.phases(), vec![Phase::Start, Phase::Success]);
    assert_eq!(recorded[0].converter.as_deref(), Some("typeset"));
    assert_eq!(recorded[0].kind, "text");
    assert_eq!(recorded[1].output.as_deref(), Some("hello.pdf"));
    assert!(recorded[1].file_size_bytes.unwrap() > 0);
    assert!(recorded[1].duration_seconds.is_some());
}

#[test]
fn test_inline_content_is_sanitized() {
    let (router, events) = router(Config::default());
    let content = format!(
        "Contact jane.doe@example.com, card 4111 1111 1111 1111. {}",
        "filler ".repeat(40)
    );
    router.convert_text(&content, None, &Options::new()).unwrap();

    let input = events.events()[0].input.clone().unwrap();
    assert!(input.contains("[EMAIL]"));
    assert!(input.contains("[CARD]"));
    assert!(!input.contains("jane.doe"));
    assert!(input.ends_with("..."));
    assert!(input.chars().count() < content.chars().count());
}

#[test]
fn test_file_inputs_log_only_the_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("salaries-2024.csv");
    std::fs::write(&input, "Name,Salary\nJane,100").unwrap();

    let (router, events) = router(Config::default());
    router.convert_file(&input, None, &Options::new()).unwrap();

    let start = &events.events()[0];
    assert_eq!(start.phase, Phase::Start);
    assert_eq!(start.input.as_deref(), Some("salaries-2024.csv"));
}

#[test]
fn test_error_messages_do_not_leak_paths() {
    let (router, events) = router(Config::default());
    let missing = std::env::temp_dir().join("topdf-private").join("payroll.docx");
    let err = router
        .convert_document(&missing, None, &Options::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let event = &events.events()[0];
    assert_eq!(event.phase, Phase::ValidationError);
    let detail = event.error.as_ref().unwrap();
    assert_eq!(detail.kind, ErrorKind::Validation);
    assert!(detail.message.contains("payroll.docx"));
    assert!(!detail.message.contains("topdf-private"));
}

#[test]
fn test_disabled_logging_records_nothing() {
    let config = Config::empty().with("logging", json!({ "enabled": false }));
    let (mut router, events) = router(config);

    router.convert_text("Hello", None, &Options::new()).unwrap();
    let _ = router.convert_text("", None, &Options::new());
    router.available_converters();
    assert!(events.events().is_empty());
    assert!(events.checks().is_empty());

    router
        .set_config(Config::empty().with("logging", json!({ "enabled": true, "level": "warn" })))
        .unwrap();
    router.convert_text("Hello", None, &Options::new()).unwrap();
    let _ = router.convert_csv("a,b\n1", None, &Options::new());
    assert_eq!(events.phases(), vec![Phase::ValidationError]);
}

#[test]
fn test_log_sink_writes_through_log_facade() {
    init_logger();
    let router = Router::new(Config::default())
        .unwrap()
        .with_sink(Arc::new(MemorySink::new()));

    router.convert_html("<p>logged</p>", None, &Options::new()).unwrap();
    let _ = router.convert_text(" ", None, &Options::new());
    let status = router.available_converters();
    assert!(status["typeset"].available);
}
