//! Collecting diagnostics of a package and its nested archives

use insta::assert_json_snapshot;
use vigil_core::{AnalysisEngine, DiagnosticSink, Report, RunContext, Severity};

fn package_report() -> Report {
    let engine = AnalysisEngine::new();
    let run = RunContext::new();
    let mut report = Report::new();
    report.set_tier(2);

    report.record_all(engine.analyze_source("bootstrap.js", "eval('a');", &run));
    report.nested("chrome/addon.jar", 1, |report| {
        report.record_all(engine.analyze_source("content/main.js", "var s = ;", &run));
    });
    report.record_all(engine.analyze_source(
        "content/overlay.js",
        "document.createElement('script');",
        &run,
    ));

    report
}

#[test]
fn nested_archives_prefix_their_files() {
    let report = package_report();

    let mut placed: Vec<(String, Option<u32>)> = report
        .diagnostics()
        .iter()
        .map(|d| (d.file.clone(), d.tier))
        .collect();
    placed.dedup();
    assert_eq!(
        placed,
        vec![
            ("bootstrap.js".to_string(), Some(2)),
            ("chrome/addon.jar/content/main.js".to_string(), Some(1)),
            ("content/overlay.js".to_string(), Some(2)),
        ]
    );
    assert_eq!(report.scope_path(), None);
    assert_eq!(report.tier(), 2);
}

#[test]
fn parse_errors_fail_the_report() {
    let report = package_report();

    assert!(report.failed());
    assert!(report.error_count() >= 1);
    assert_eq!(report.warning_count(), 2);
    assert_eq!(report.notice_count(), 0);
}

#[test]
fn warnings_alone_do_not_fail() {
    let mut report = Report::new();
    report.record_all(AnalysisEngine::new().analyze_source(
        "main.js",
        "setTimeout('tick()', 10);",
        &RunContext::new(),
    ));

    assert!(!report.failed());
    assert!(report.diagnostics().iter().all(|d| d.severity == Severity::Warning));
}

#[test]
fn report_serializes_its_diagnostics() {
    let mut report = Report::new();
    report.record_all(AnalysisEngine::new().analyze_source("main.js", "eval;", &RunContext::new()));

    let value = serde_json::to_value(&report).unwrap();
    let first = &value["diagnostics"][0];

    assert_json_snapshot!(
        (first["rule_id"].clone(), first["severity"].clone(), first["tier"].clone()),
        @r###"
    [
      "javascript::dangerous_global",
      "warning",
      1
    ]
    "###
    );
}
