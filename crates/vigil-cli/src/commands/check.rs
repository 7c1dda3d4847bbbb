//! Check command - analyzes an unpacked extension package

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use vigil_core::analysis::AnalysisEngine;
use vigil_core::config::{Config, find_config_file, load_config_with_warnings};
use vigil_core::context::{BOOTSTRAP, ResourceState, RunContext};
use vigil_core::diagnostic::{Diagnostic, Severity};
use vigil_core::markup;
use vigil_core::parser::ParsedFile;
use vigil_core::report::{DiagnosticSink, Report};
use walkdir::WalkDir;

use super::Outcome;
use crate::output::OutputFormat;
use crate::output::json::{JsonFormatter, RunSummary};
use crate::output::text::TextFormatter;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsm"];
const NESTED_PACKAGE_EXTENSIONS: &[&str] = &["jar", "xpi"];
const INSTALL_MANIFEST: &str = "install.rdf";
const NESTED_TIER: u32 = 1;
/// Traversal recurses once per nesting level of the analyzed code.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailOn {
    Errors,
    Warnings,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Unpacked extension directory, or a single script or markup file
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Output format for the report
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Config file to use instead of searching for vigil.toml
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Treat the package as bootstrapped whatever install.rdf says
    #[arg(long)]
    pub bootstrap: bool,

    /// Hide notices and rule descriptions
    #[arg(short, long)]
    pub quiet: bool,

    /// Lowest severity that makes the run fail
    #[arg(long, value_enum, default_value = "errors")]
    pub fail_on: FailOn,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl CheckArgs {
    pub fn run(&self) -> Result<Outcome> {
        self.configure_colors();

        let root = package_root(&self.path)?;
        let config = self.load_config(&root)?;
        let package = discover_package(&self.path, &config)?;

        let engine = AnalysisEngine::with_config(&config);
        for reference in engine.filter().unknown_references() {
            warn!(rule = %reference, "config refers to an unknown rule");
        }

        let run = self.run_context(&package.root, &config);
        let mut checker = Checker::new(&engine, &run)?;
        let mut report = Report::with_tier(config.analysis.tier);

        info!(files = package.file_count(), path = %self.path.display(), "analyzing package");
        checker.check_package(&package, &mut report);

        let passed = self.passed(&report);
        let diagnostics: Vec<Diagnostic> = report
            .into_diagnostics()
            .into_iter()
            .filter(|d| !self.quiet || d.severity != Severity::Notice)
            .collect();

        match self.format {
            OutputFormat::Json => {
                let analyzed_path = self.path.to_string_lossy();
                let summary = RunSummary {
                    analyzed_path: &analyzed_path,
                    total_files: package.file_count(),
                    passed,
                    scripts: &checker.scripts,
                };
                println!(
                    "{}",
                    JsonFormatter::with_catalog(engine.catalog()).format(&diagnostics, &summary)
                );
            }
            OutputFormat::Text => {
                let formatter = if self.quiet {
                    TextFormatter::compact()
                } else {
                    TextFormatter::new()
                };
                print!("{}", formatter.format(&diagnostics));
                if diagnostics.is_empty() && !self.quiet {
                    println!("No problems found in {} file(s).", package.file_count());
                }
            }
        }

        Ok(Outcome::from_passed(passed))
    }

    fn passed(&self, report: &Report) -> bool {
        let warnings_fail = self.fail_on == FailOn::Warnings && report.warning_count() > 0;
        !report.failed() && !warnings_fail
    }

    fn load_config(&self, root: &Path) -> Result<Config> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => find_config_file(root),
        };
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let result = load_config_with_warnings(&path)
            .with_context(|| format!("could not load {}", path.display()))?;
        for warning in &result.warnings {
            warn!(config = %path.display(), "{warning}");
        }
        Ok(result.config)
    }

    /// Resource flags from the install manifest, then config overrides, then
    /// the command line.
    fn run_context(&self, root: &Path, config: &Config) -> RunContext {
        let mut run = RunContext::new();

        let detected = detect_bootstrap(root);
        if detected != ResourceState::Unknown {
            debug!(state = ?detected, "bootstrap flag from {INSTALL_MANIFEST}");
            run.set_resource(BOOTSTRAP, detected);
        }
        config.apply_resources(&mut run);
        if self.bootstrap {
            run.set_resource(BOOTSTRAP, true);
        }

        run
    }

    fn configure_colors(&self) {
        let no_color_env = std::env::var("NO_COLOR").is_ok();
        if self.no_color || no_color_env || self.format == OutputFormat::Json {
            colored::control::set_override(false);
        }
    }
}

/// Files of one package. Directories named like archives are packages of
/// their own and are analyzed in a nested report scope.
#[derive(Debug, Default)]
struct Package {
    root: PathBuf,
    files: Vec<PathBuf>,
    nested: Vec<Package>,
}

impl Package {
    fn file_count(&self) -> usize {
        self.files.len() + self.nested.iter().map(Package::file_count).sum::<usize>()
    }
}

#[derive(Debug, Default)]
struct FileAnalysis {
    diagnostics: Vec<Diagnostic>,
    scripts: BTreeSet<String>,
}

struct Checker<'a> {
    engine: &'a AnalysisEngine,
    run: &'a RunContext,
    pool: rayon::ThreadPool,
    scripts: BTreeSet<String>,
}

impl<'a> Checker<'a> {
    fn new(engine: &'a AnalysisEngine, run: &'a RunContext) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .stack_size(WORKER_STACK_SIZE)
            .build()
            .context("could not start analysis threads")?;
        Ok(Self {
            engine,
            run,
            pool,
            scripts: BTreeSet::new(),
        })
    }

    fn check_package(&mut self, package: &Package, report: &mut Report) {
        let (engine, run) = (self.engine, self.run);
        let results: Vec<FileAnalysis> = self.pool.install(|| {
            package
                .files
                .par_iter()
                .map(|path| analyze_file(engine, run, &package.root, path))
                .collect()
        });

        for result in results {
            report.record_all(result.diagnostics);
            self.scripts.extend(result.scripts);
        }

        for nested in &package.nested {
            let name = relative_name(&package.root, &nested.root);
            report.nested(&name, NESTED_TIER, |report| self.check_package(nested, report));
        }
    }
}

fn analyze_file(
    engine: &AnalysisEngine,
    run: &RunContext,
    root: &Path,
    path: &Path,
) -> FileAnalysis {
    let name = relative_name(root, path);
    let source = match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(error) => {
            warn!(file = %name, %error, "could not read file");
            return FileAnalysis::default();
        }
    };
    let source = source.strip_prefix('\u{feff}').unwrap_or(&source);

    if markup::is_markup_file(&name) {
        let analysis = engine.analyze_markup(&name, source, run);
        debug!(file = %name, scripts = analysis.scripts.len(), "scanned markup");
        FileAnalysis {
            diagnostics: analysis.diagnostics,
            scripts: analysis.scripts,
        }
    } else {
        let parsed = ParsedFile::from_source(&name, source);
        FileAnalysis {
            diagnostics: engine.analyze(&parsed, run),
            scripts: BTreeSet::new(),
        }
    }
}

fn package_root(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }
    Ok(path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf))
}

fn discover_package(path: &Path, config: &Config) -> Result<Package> {
    let root = package_root(path)?;

    if path.is_file() {
        let files = if is_supported_file(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
        return Ok(Package {
            root,
            files,
            nested: Vec::new(),
        });
    }

    Ok(walk_package(&root, config))
}

fn walk_package(root: &Path, config: &Config) -> Package {
    let mut package = Package {
        root: root.to_path_buf(),
        ..Package::default()
    };

    let mut entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "skipping unreadable entry");
                continue;
            }
        };

        if entry.depth() > 0 && entry.file_type().is_dir() && is_nested_package(entry.path()) {
            entries.skip_current_dir();
            package.nested.push(walk_package(entry.path(), config));
            continue;
        }

        if entry.file_type().is_file()
            && is_supported_file(entry.path())
            && config.accepts(&relative_name(root, entry.path()))
        {
            package.files.push(entry.into_path());
        }
    }

    package
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_supported_file(path: &Path) -> bool {
    match extension(path) {
        Some(ext) => {
            SCRIPT_EXTENSIONS.contains(&ext.as_str()) || markup::MARKUP_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

fn is_nested_package(path: &Path) -> bool {
    extension(path).is_some_and(|ext| NESTED_PACKAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn detect_bootstrap(root: &Path) -> ResourceState {
    match fs::read_to_string(root.join(INSTALL_MANIFEST)) {
        Ok(manifest) => bootstrap_flag(&manifest),
        Err(_) => ResourceState::Unknown,
    }
}

/// Reads `em:bootstrap` from an install manifest, in element or attribute
/// form.
fn bootstrap_flag(manifest: &str) -> ResourceState {
    let element = manifest
        .split_once("<em:bootstrap>")
        .and_then(|(_, rest)| rest.split_once("</em:bootstrap>"))
        .map(|(value, _)| value);

    let attribute = || {
        let (_, rest) = manifest.split_once("em:bootstrap=")?;
        let rest = rest.trim_start();
        let quote = rest.chars().next().filter(|c| matches!(c, '"' | '\''))?;
        rest[quote.len_utf8()..].split(quote).next()
    };

    match element.or_else(attribute).map(str::trim) {
        Some(value) => (value == "true").into(),
        None => ResourceState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn args(path: &Path) -> CheckArgs {
        CheckArgs {
            path: path.to_path_buf(),
            format: OutputFormat::Json,
            config: None,
            bootstrap: false,
            quiet: true,
            fail_on: FailOn::Errors,
            no_color: true,
        }
    }

    fn names(package: &Package) -> Vec<String> {
        package
            .files
            .iter()
            .map(|path| relative_name(&package.root, path))
            .collect()
    }

    #[test]
    fn discovers_scripts_and_markup() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("content");
        fs::create_dir(&content).unwrap();
        File::create(content.join("overlay.js")).unwrap();
        File::create(content.join("overlay.xul")).unwrap();
        File::create(dir.path().join("README.md")).unwrap();

        let package = discover_package(dir.path(), &Config::default()).unwrap();

        assert_eq!(names(&package), vec!["content/overlay.js", "content/overlay.xul"]);
    }

    #[test]
    fn skips_hidden_entries() {
        let dir = tempdir().unwrap();
        let hidden = dir.path().join(".git");
        fs::create_dir(&hidden).unwrap();
        File::create(hidden.join("hook.js")).unwrap();
        File::create(dir.path().join(".eslintrc.js")).unwrap();
        File::create(dir.path().join("bootstrap.js")).unwrap();

        let package = discover_package(dir.path(), &Config::default()).unwrap();

        assert_eq!(names(&package), vec!["bootstrap.js"]);
    }

    #[test]
    fn archive_directories_become_nested_packages() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("chrome").join("addon.jar");
        fs::create_dir_all(jar.join("content")).unwrap();
        File::create(jar.join("content").join("main.js")).unwrap();
        File::create(dir.path().join("bootstrap.js")).unwrap();

        let package = discover_package(dir.path(), &Config::default()).unwrap();

        assert_eq!(names(&package), vec!["bootstrap.js"]);
        assert_eq!(package.nested.len(), 1);
        assert_eq!(names(&package.nested[0]), vec!["content/main.js"]);
        assert_eq!(package.file_count(), 2);
    }

    #[test]
    fn config_filters_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        File::create(dir.path().join("lib").join("jquery.js")).unwrap();
        File::create(dir.path().join("main.js")).unwrap();
        let config = Config {
            exclude: vec!["lib/".into()],
            ..Config::default()
        };

        let package = discover_package(dir.path(), &config).unwrap();

        assert_eq!(names(&package), vec!["main.js"]);
    }

    #[test]
    fn single_files_are_their_own_package() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("main.js");
        File::create(&file).unwrap();

        let package = discover_package(&file, &Config::default()).unwrap();

        assert_eq!(package.root, dir.path());
        assert_eq!(names(&package), vec!["main.js"]);
    }

    #[test]
    fn missing_paths_are_errors() {
        let dir = tempdir().unwrap();
        assert!(discover_package(&dir.path().join("missing"), &Config::default()).is_err());
    }

    #[test]
    fn reads_the_bootstrap_flag() {
        assert_eq!(
            bootstrap_flag("<em:bootstrap>true</em:bootstrap>"),
            ResourceState::Enabled
        );
        assert_eq!(
            bootstrap_flag("<em:bootstrap> false </em:bootstrap>"),
            ResourceState::Disabled
        );
        assert_eq!(
            bootstrap_flag(r#"<Description em:id="a@b" em:bootstrap="true"/>"#),
            ResourceState::Enabled
        );
        assert_eq!(bootstrap_flag("<em:type>2</em:type>"), ResourceState::Unknown);
    }

    #[test]
    fn bootstrap_sources_are_layered() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(INSTALL_MANIFEST),
            "<RDF><em:bootstrap>true</em:bootstrap></RDF>",
        )
        .unwrap();

        let detected = args(dir.path()).run_context(dir.path(), &Config::default());
        assert!(detected.is_enabled(BOOTSTRAP));

        let mut config = Config::default();
        config.resources.insert(BOOTSTRAP.to_string(), false);
        let overridden = args(dir.path()).run_context(dir.path(), &config);
        assert_eq!(overridden.resource(BOOTSTRAP), ResourceState::Disabled);

        let mut forced = args(dir.path());
        forced.bootstrap = true;
        assert!(forced.run_context(dir.path(), &config).is_enabled(BOOTSTRAP));
    }

    #[test]
    fn nested_diagnostics_carry_the_archive_path() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("addon.jar");
        fs::create_dir(&jar).unwrap();
        fs::write(jar.join("main.js"), "eval('x');").unwrap();
        fs::write(dir.path().join("bootstrap.js"), "eval('y');").unwrap();

        let package = discover_package(dir.path(), &Config::default()).unwrap();
        let engine = AnalysisEngine::new();
        let run = RunContext::new();
        let mut checker = Checker::new(&engine, &run).unwrap();
        let mut report = Report::with_tier(2);
        checker.check_package(&package, &mut report);

        let placed: Vec<(&str, Option<u32>)> = report
            .diagnostics()
            .iter()
            .map(|d| (d.file.as_str(), d.tier))
            .collect();
        assert_eq!(
            placed,
            vec![("bootstrap.js", Some(2)), ("addon.jar/main.js", Some(1))]
        );
    }

    #[test]
    fn markup_scripts_are_collected() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("overlay.xul"),
            "<overlay><script src=\"chrome://addon/content/a.js\"/></overlay>",
        )
        .unwrap();

        let package = discover_package(dir.path(), &Config::default()).unwrap();
        let engine = AnalysisEngine::new();
        let run = RunContext::new();
        let mut checker = Checker::new(&engine, &run).unwrap();
        checker.check_package(&package, &mut Report::new());

        assert!(checker.scripts.contains("chrome://addon/content/a.js"));
    }

    #[test]
    fn parse_errors_fail_and_warnings_fail_on_request() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.js"), "var = ;").unwrap();
        assert_eq!(args(dir.path()).run().unwrap(), Outcome::Failed);

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "eval('x');").unwrap();
        assert_eq!(args(dir.path()).run().unwrap(), Outcome::Passed);

        let mut strict = args(dir.path());
        strict.fail_on = FailOn::Warnings;
        assert_eq!(strict.run().unwrap(), Outcome::Failed);
    }

    #[test]
    fn broken_config_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("vigil.toml"), "rules = [").unwrap();
        fs::write(dir.path().join("main.js"), "var a = 1;").unwrap();

        assert!(args(dir.path()).run().is_err());
    }

    #[test]
    fn extension_matching_ignores_case() {
        assert!(is_supported_file(Path::new("content/Overlay.XUL")));
        assert!(is_supported_file(Path::new("modules/util.jsm")));
        assert!(!is_supported_file(Path::new("skin/style.css")));
        assert!(is_nested_package(Path::new("chrome/addon.JAR")));
    }
}
