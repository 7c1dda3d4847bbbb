//! End-to-end tests for the semantic JavaScript analysis
//!
//! Runs whole scripts through the analysis engine and checks the
//! diagnostics an extension author would see.

use insta::assert_json_snapshot;
use serde::Serialize;
use vigil_core::javascript::dispatch::CALLED_DANGEROUS_GLOBAL;
use vigil_core::{AnalysisEngine, BOOTSTRAP, Diagnostic, RunContext};

#[derive(Serialize)]
struct DiagnosticSnapshot {
    rule: String,
    line: usize,
    message: String,
}

fn snapshot(diagnostics: &[Diagnostic]) -> Vec<DiagnosticSnapshot> {
    diagnostics
        .iter()
        .map(|d| DiagnosticSnapshot {
            rule: d.rule_id.to_string(),
            line: d.line,
            message: d.message.clone(),
        })
        .collect()
}

fn analyze(filename: &str, code: &str) -> Vec<Diagnostic> {
    AnalysisEngine::new().analyze_source(filename, code, &RunContext::new())
}

#[test]
fn xpcom_interfaces_share_one_instance() {
    let code = "var json = Cc['@mozilla.org/dom/json;1'].getService(Ci.nsIJSON);\n\
                var observers = json.QueryInterface(Ci.nsIObserverService);\n\
                observers.marker = setTimeout;\n\
                json.marker('later()');\n";

    let diagnostics = analyze("content/main.js", code);

    assert_json_snapshot!(snapshot(&diagnostics), @r###"
    [
      {
        "rule": "javascript::called_dangerous_global",
        "line": 4,
        "message": "`setTimeout` called in a dangerous manner"
      }
    ]
    "###);
}

#[test]
fn dangerous_globals_in_a_realistic_overlay() {
    let code = "var addon = {\n\
                \x20 init: function () {\n\
                \x20   var code = 'run' + '()';\n\
                \x20   eval(code);\n\
                \x20   setTimeout(function () { addon.init(); }, 1000);\n\
                \x20 }\n\
                };\n";

    let diagnostics = analyze("content/overlay.js", code);

    assert_json_snapshot!(snapshot(&diagnostics), @r###"
    [
      {
        "rule": "javascript::dangerous_global",
        "line": 4,
        "message": "Access to the `eval` global"
      }
    ]
    "###);
}

#[test]
fn function_bodies_are_analyzed_in_order() {
    let code = "function later() { setTimeout('a()', 1); }\nfunction sooner() { eval; }\n";

    let diagnostics = analyze("main.js", code);

    let lines: Vec<usize> = diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![1, 2]);
}

#[test]
fn bootstrap_cleanup_depends_on_the_run_context() {
    let code = "var os = Cc['@mozilla.org/observer-service;1'].getService(Ci.nsIObserverService);\n\
                os.addObserver(observer, 'quit-application', false);\n";
    let engine = AnalysisEngine::new();

    let count = |run: &RunContext| {
        engine
            .analyze_source("bootstrap.js", code, run)
            .iter()
            .filter(|d| d.rule_id == CALLED_DANGEROUS_GLOBAL)
            .count()
    };

    assert_eq!(count(&RunContext::new()), 0);
    assert_eq!(count(&RunContext::new().with_resource(BOOTSTRAP, false)), 0);
    assert_eq!(count(&RunContext::new().with_resource(BOOTSTRAP, true)), 1);
}

#[test]
fn preference_files_are_checked_by_path() {
    let code = "pref('network.proxy.type', 1);\npref('extensions.myaddon.interval', 5);\n";

    let in_defaults = analyze("defaults/preferences/prefs.js", code);
    let elsewhere = analyze("content/prefs.js", code);

    assert_eq!(in_defaults.len(), 1, "{in_defaults:?}");
    assert_eq!(in_defaults[0].line, 1);
    assert!(elsewhere.is_empty(), "{elsewhere:?}");
}

#[test]
fn fatal_syntax_errors_stop_only_their_own_file() {
    let engine = AnalysisEngine::new();
    let run = RunContext::new();

    let broken = engine.analyze_source("broken.js", "var a = ;\neval('x');\n", &run);
    let rules: Vec<String> = broken.iter().map(|d| d.rule_id.to_string()).collect();
    assert!(!rules.is_empty());
    assert!(rules.iter().all(|r| r == "javascript::parse_error"), "{rules:?}");
    assert_eq!(broken[0].line, 1);

    let sibling = engine.analyze_source("sibling.js", "var a = 1;\neval('x');\n", &run);
    assert_eq!(sibling.len(), 1);
    assert_eq!(sibling[0].rule_id.to_string(), "javascript::dangerous_global");
    assert_eq!(sibling[0].line, 2);
}

#[test]
fn repeated_runs_agree() {
    let code = "var w = window;\nw.setTimeout('x()', 1);\nw.top = 1;\ndocument.createElement('script');\n";
    let engine = AnalysisEngine::new();
    let run = RunContext::new();

    let first = engine.analyze_source("main.js", code, &run);
    for _ in 0..5 {
        assert_eq!(engine.analyze_source("main.js", code, &run), first);
    }
}
