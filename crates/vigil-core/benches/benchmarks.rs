use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use vigil_core::analysis::AnalysisEngine;
use vigil_core::context::RunContext;
use vigil_core::parser::ParsedFile;

fn generate_overlay_script(modules: usize) -> String {
    let mut code = String::with_capacity(modules * 600);
    code.push_str("// Generated overlay script for benchmarking\n\n");

    for i in 0..modules {
        code.push_str(&format!(
            r#"var addon{i} = {{
    prefs: Cc["@mozilla.org/preferences-service;1"].getService(Ci.nsIPrefService),
    count: 0,
    init: function () {{
        var self = this;
        this.count = Math.max(this.count, {i}) + 1;
        var label = "item-" + this.count;
        setTimeout(function () {{ self.refresh(label); }}, 100);
    }},
    refresh: function (label) {{
        var doc = gBrowser.contentDocument;
        var node = doc.createElement("div");
        node.textContent = label;
        return node;
    }}
}};
window.addEventListener("load", function () {{ addon{i}.init(); }}, false);

"#
        ));
    }

    code
}

fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");

    let code = generate_overlay_script(25);
    group.throughput(Throughput::Elements(code.lines().count() as u64));
    group.bench_function("parse_overlay", |b| {
        b.iter(|| ParsedFile::from_source(black_box("overlay.js"), black_box(&code)))
    });

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    let engine = AnalysisEngine::new();
    let run = RunContext::new();

    let dangerous = r#"
var x = new XMLHttpRequest();
x.open("GET", "http://example.com/", false);
setTimeout("doSomething()", 10);
eval("1 + 1");
var json = Cc["@mozilla.org/dom/json;1"].createInstance(Ci.nsIJSON);
json.encode({});
document.createElement("script");
"#;
    let dangerous_file = ParsedFile::from_source("dangerous.js", dangerous);
    group.bench_function("dangerous_calls", |b| {
        b.iter(|| engine.analyze(black_box(&dangerous_file), black_box(&run)))
    });

    for size in [5, 25, 100] {
        let file = ParsedFile::from_source("overlay.js", &generate_overlay_script(size));
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("overlay_modules", size), &file, |b, file| {
            b.iter(|| engine.analyze(black_box(file), black_box(&run)))
        });
    }

    group.finish();
}

fn bench_markup(c: &mut Criterion) {
    let mut group = c.benchmark_group("markup");
    let engine = AnalysisEngine::new();
    let run = RunContext::new();

    let mut document = String::from("<?xml version=\"1.0\"?>\n<overlay>\n");
    for i in 0..50 {
        document.push_str(&format!(
            "  <!-- module {i} -->\n  <script src=\"chrome://addon/content/m{i}.js\"/>\n  \
             <script><![CDATA[\n    var v{i} = Math.round({i}.5);\n  ]]></script>\n"
        ));
    }
    document.push_str("</overlay>\n");

    group.bench_function("overlay_with_50_scripts", |b| {
        b.iter(|| engine.analyze_markup(black_box("overlay.xul"), black_box(&document), &run))
    });

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_analysis, bench_markup);
criterion_main!(benches);
