use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use initializer::DiagnosticError;
use initializer::marker::{INITIALIZED_EVENT, NAME_ATTR};
use markup::NodeId;

use crate::registry_config::{RegistryConfig, stub_registry};

const FIXTURE_SUFFIX: &str = ".test.html";

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Correlation token passed to the initializer. Defaults to none.
    #[serde(default)]
    pub token: Option<String>,

    /// Runtimes and initializers available to the page.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Accept every runtime and initializer the page names, ignoring `registry`.
    #[serde(default)]
    pub stub: bool,

    /// Block names in the order their initialized event fired.
    #[serde(default)]
    pub expect_order: Option<Vec<String>>,

    /// Names of the top-level instances returned.
    #[serde(default)]
    pub expect_roots: Option<Vec<String>>,

    /// Expected fault: the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If true, the test expects the markup to be rejected.
    #[serde(default)]
    pub expect_parse_error: bool,

    /// Expected warnings. If present (even empty), warning count and content are checked.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

/// Parse a `.test.html` file into its TOML config and markup.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}'); // strip BOM

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let source = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    // 1. Read file
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };

    // 2. Parse frontmatter
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };

    let description = config.description.clone();

    // 3. Parse markup
    let parse_result = markup::Parser::new(source.to_string(), 0).parse();

    // 4. Handle expect_parse_error
    if config.expect_parse_error {
        return TestResult {
            path: path.to_path_buf(),
            description,
            outcome: match parse_result {
                Err(_) => TestOutcome::Pass,
                Ok(_) => TestOutcome::Fail("expected parse error, but parsing succeeded".into()),
            },
        };
    }

    let mut document = match parse_result {
        Ok(d) => d,
        Err(errs) => {
            let msgs: Vec<String> = errs.iter().map(|e| e.message.clone()).collect();
            return fail(description, format!("unexpected parse error: {}", msgs.join("; ")));
        }
    };

    // 5. Initialize, recording the initialized events as they bubble to the root
    let registry = if config.stub {
        stub_registry(&document)
    } else {
        config.registry.build()
    };

    let fired: Rc<RefCell<Vec<NodeId>>> = Rc::default();
    let root = document.root();
    let sink = fired.clone();
    document.on(root, INITIALIZED_EVENT, move |event| sink.borrow_mut().push(event.target));

    let init_result =
        initializer::initialize_all(&mut document, root, config.token.as_deref(), &registry);

    let order: Vec<String> = fired
        .borrow()
        .iter()
        .map(|&id| document.attr(id, NAME_ATTR).unwrap_or("").to_string())
        .collect();

    // 6. Split result into instances/error and diagnostics
    let (init_result, diagnostics) = match init_result {
        Ok((instances, diags)) => (Ok(instances), diags),
        Err(err) => (Err(err), Vec::new()),
    };

    // 7. Check error/root expectations
    let outcome = match (&config.expect_error, init_result) {
        (Some(expected_err), Err(err)) => {
            let err_str = err.to_string();
            if err_str.contains(expected_err.as_str()) {
                None
            } else {
                Some(format!(
                    "expected error containing \"{}\", got: {}",
                    expected_err, err_str
                ))
            }
        }
        (Some(expected_err), Ok(_)) => Some(format!(
            "expected error containing \"{}\", but initialization succeeded",
            expected_err
        )),
        (None, Err(err)) => Some(format!("unexpected initialization error: {}", err)),
        (None, Ok(instances)) => config.expect_roots.as_ref().and_then(|expected| {
            let actual: Vec<String> = instances
                .iter()
                .map(|i| i.name.clone().unwrap_or_default())
                .collect();
            (actual != *expected).then(|| {
                format!(
                    "root mismatch\n  expected: {:?}\n  actual:   {:?}",
                    expected, actual
                )
            })
        }),
    };

    if let Some(reason) = outcome {
        return fail(description, reason);
    }

    // 8. Check initialization order (also meaningful after a fault: no rollback)
    if let Some(expected) = &config.expect_order {
        if order != *expected {
            return fail(
                description,
                format!(
                    "initialization order mismatch\n  expected: {:?}\n  actual:   {:?}",
                    expected, order
                ),
            );
        }
    }

    // 9. Check warning expectations
    if let Some(expected_warnings) = &config.expect_warnings {
        if let Some(reason) = check_warnings(source, &diagnostics, expected_warnings) {
            return fail(description, reason);
        }
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

/// 1-based line holding byte `offset`.
fn line_of(source: &str, offset: usize) -> usize {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// Compare the warnings raised against the expected ones, pairwise and in
/// order. Returns the first mismatch.
fn check_warnings(
    source: &str,
    diagnostics: &[DiagnosticError],
    expected: &[ExpectedWarning],
) -> Option<String> {
    let warnings: Vec<&DiagnosticError> = diagnostics.iter().filter(|d| d.is_warning).collect();
    if warnings.len() != expected.len() {
        let listed: String = warnings.iter().map(|w| format!("\n  - {}", w)).collect();
        return Some(format!(
            "expected {} warning(s), got {}{}",
            expected.len(),
            warnings.len(),
            listed
        ));
    }

    warnings
        .iter()
        .zip(expected)
        .enumerate()
        .find_map(|(i, (warning, want))| {
            let message = warning.to_string();
            if !message.contains(&want.contains) {
                return Some(format!(
                    "warning[{}]: {:?} does not contain {:?}",
                    i, message, want.contains
                ));
            }
            let want_line = want.line?;
            let line = warning.span.as_ref().map(|span| line_of(source, span.start));
            (line != Some(want_line)).then(|| match line {
                Some(line) => format!("warning[{}]: on line {}, expected line {}", i, line, want_line),
                None => format!("warning[{}]: has no span, expected line {}", i, want_line),
            })
        })
}

/// Fixture files under `root`, keyed by their directory relative to `root`
/// ("" for files directly inside it). Files are sorted within each category.
fn fixtures_by_category(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                dirs.push(path);
            } else if path.to_string_lossy().ends_with(FIXTURE_SUFFIX) {
                let category = dir
                    .strip_prefix(root)
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                categories.entry(category).or_default().push(path);
            }
        }
    }
    categories.values_mut().for_each(|files| files.sort());
    categories
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = fixtures_by_category(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", FIXTURE_SUFFIX, path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Keep the requested categories and everything nested below them.
fn select_categories(
    all: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    if requested.is_empty() {
        return all;
    }
    let wanted: Vec<&str> = requested.iter().map(|r| r.trim_matches('/')).collect();
    for want in &wanted {
        let known = all
            .keys()
            .any(|c| c == want || c.starts_with(&format!("{}/", want)));
        if !known {
            let available: Vec<&str> = all.keys().map(|c| category_label(c)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                want,
                available.join(", ")
            );
        }
    }
    all.into_iter()
        .filter(|(category, _)| {
            wanted
                .iter()
                .any(|want| category == want || category.starts_with(&format!("{}/", want)))
        })
        .collect()
}

/// ANSI styling that can be switched off with `--no-color`.
struct Palette {
    color: bool,
}

impl Palette {
    fn paint(&self, text: &str, sgr: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", sgr, text)
        } else {
            text.to_string()
        }
    }
}

/// Running tally of fixture outcomes.
#[derive(Default)]
struct Report {
    passed: usize,
    failures: Vec<TestResult>,
}

impl Report {
    fn record(&mut self, result: TestResult, palette: &Palette) {
        let name = result.description.clone().unwrap_or_else(|| {
            result
                .path
                .file_name()
                .map(|n| n.to_string_lossy().trim_end_matches(FIXTURE_SUFFIX).to_string())
                .unwrap_or_default()
        });
        match result.outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                eprintln!("  {}  {}", palette.paint("PASS", "32"), name);
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", palette.paint("FAIL", "31"), name);
                self.failures.push(result);
            }
        }
    }

    /// Print the failure details and summary line, returning the exit code.
    fn finish(self, palette: &Palette) -> i32 {
        if !self.failures.is_empty() {
            eprintln!("\nfailures:");
        }
        for failure in &self.failures {
            eprintln!("\n  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                reason.lines().for_each(|line| eprintln!("  {}", line));
            }
        }

        let failed = self.failures.len();
        let verdict = if failed == 0 {
            palette.paint("ok", "32")
        } else {
            palette.paint("FAILED", "31")
        };
        eprintln!(
            "\ntest result: {}. {} passed, {} failed",
            verdict, self.passed, failed
        );
        i32::from(failed > 0)
    }
}

/// Run all fixture files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let single_file = path.is_file();
    let selected = if single_file {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let all = fixtures_by_category(path);
        if all.is_empty() {
            eprintln!("no {} files found in {}", FIXTURE_SUFFIX, path.display());
            return 1;
        }
        select_categories(all, categories)
    };
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let palette = Palette { color: !no_color };
    let mut report = Report::default();
    for (category, files) in &selected {
        if !single_file {
            eprintln!("\n{}", palette.paint(category_label(category), "1"));
        }
        for file in files {
            report.record(run_single_test(file), &palette);
        }
    }
    report.finish(&palette)
}
