mod registry_config;
mod test_runner;

use std::cell::RefCell;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use env_logger::Env;

use initializer::marker::{BLOCK_CLASS, INITIALIZED_EVENT, MarkerConfig};
use initializer::{DiagnosticError, Registry};
use markup::NodeId;

use registry_config::{RegistryConfig, stub_registry};

#[derive(Parser)]
#[command(name = "blockinit", version, about = "Initialize the blocks of a rendered page")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log each initialization step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize every block on a page
    Run(RunArgs),

    /// Run .test.html fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// HTML page to initialize
    file: PathBuf,

    /// TOML file declaring runtimes and initializers
    #[arg(short, long, conflicts_with = "stub")]
    registry: Option<PathBuf>,

    /// Correlation token of the rendering pass to initialize
    #[arg(short, long)]
    token: Option<String>,

    /// Accept every runtime and initializer the page names
    #[arg(long)]
    stub: bool,

    /// Parse only and list the blocks found (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Print the returned instance tree as JSON
    #[arg(long)]
    tree: bool,

    /// Suppress the per-block progress lines
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.html file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "error" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = test_args.path.as_path();
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    // Read source
    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file.display(), e);
            process::exit(1);
        }
    };

    // Set up codespan file database
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.display().to_string(), source.clone());

    // Parse
    let mut document = match markup::Parser::new(source, file_id).parse() {
        Ok(d) => d,
        Err(errors) => {
            for error in &errors {
                let diagnostic = error.to_diagnostic();
                let _ =
                    term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
            }
            process::exit(1);
        }
    };

    // --check: parse succeeded, list the markers and exit
    if args.check {
        let markers = document.elements_with_class(BLOCK_CLASS);
        for &marker in &markers {
            let marker_config = MarkerConfig::read(&document, marker);
            println!(
                "{} {}",
                marker,
                marker_config.init_fn.as_deref().unwrap_or("(no initializer)")
            );
        }
        eprintln!(
            "ok: {} parsed successfully, {} block(s)",
            args.file.display(),
            markers.len()
        );
        return;
    }

    let registry = match build_registry(&args, &document) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    // Progress lines follow the initialized events as they bubble to the root
    let fired: Rc<RefCell<Vec<NodeId>>> = Rc::default();
    let root = document.root();
    let sink = fired.clone();
    document.on(root, INITIALIZED_EVENT, move |event| sink.borrow_mut().push(event.target));

    let result = initializer::initialize_all(&mut document, root, args.token.as_deref(), &registry);

    if !args.quiet {
        for &node in fired.borrow().iter() {
            let marker_config = MarkerConfig::read(&document, node);
            println!(
                "initialized {} ({})",
                marker_config.name.as_deref().unwrap_or("?"),
                marker_config.block_type.as_deref().unwrap_or("?")
            );
        }
    }

    match result {
        Ok((instances, warnings)) => {
            emit_diagnostics(&writer, &config, &files, &warnings);
            if args.tree {
                let tree = serde_json::Value::Array(instances.iter().map(|i| i.to_json()).collect());
                match serde_json::to_string_pretty(&tree) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("error: cannot serialize instance tree: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Err(error) => {
            emit_diagnostic_error(&writer, &config, &files, &error);
            process::exit(1);
        }
    }
}

fn build_registry(
    args: &RunArgs,
    document: &markup::Document,
) -> Result<Registry, registry_config::ConfigError> {
    if args.stub {
        return Ok(stub_registry(document));
    }
    match &args.registry {
        Some(path) => Ok(RegistryConfig::load_from_path(path)?.build()),
        None => {
            log::info!("no registry given, every bound block will fail to resolve");
            Ok(Registry::new())
        }
    }
}

fn emit_diagnostic_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    if let Some(span) = &error.span {
        let severity = if error.is_warning {
            Severity::Warning
        } else {
            Severity::Error
        };
        let diagnostic = Diagnostic::new(severity)
            .with_message(error.to_string())
            .with_labels(vec![Label::primary(error.source_id, span.clone())]);
        let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
    } else {
        let prefix = if error.is_warning {
            "warning"
        } else {
            "initialization error"
        };
        eprintln!("{}: {}", prefix, error);
    }
}

fn emit_diagnostics(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostics: &[DiagnosticError],
) {
    for diag in diagnostics {
        emit_diagnostic_error(writer, config, files, diag);
    }
}
