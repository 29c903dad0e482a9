//! scrutiny entry point.
//!
//! Assembles [`Settings`] from the command line, builds the explicit check
//! registry, runs the worker pool over the given translation units, and
//! exits with the number of error-severity diagnostics.

use clap::{Parser, ValueEnum};
use scrutiny_engine::errorlogger::{ConcurrentSink, JsonSink, TextSink};
use scrutiny_engine::settings::LanguageMode;
use scrutiny_engine::{builtin_checks, Ctu, Executor, Settings, Suppressions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LanguageArg {
    C,
    #[value(name = "c++")]
    Cpp,
}

/// Static analysis for C and C++ across preprocessor configurations.
#[derive(Parser, Debug)]
#[command(name = "scrutiny", version, about)]
struct Args {
    /// Source files to analyze.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Define a preprocessor macro (NAME or NAME=value).
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Undefine a preprocessor macro.
    #[arg(short = 'U', value_name = "NAME")]
    undefines: Vec<String>,

    /// Add a directory to the include search path.
    #[arg(short = 'I', value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Number of worker threads (0 = hardware concurrency).
    #[arg(short = 'j', long, default_value_t = 0)]
    jobs: usize,

    /// Maximum number of preprocessor configurations per file.
    #[arg(long, default_value_t = 12)]
    max_configs: usize,

    /// Check all configurations regardless of --max-configs.
    #[arg(long)]
    force: bool,

    /// Enable additional severities (warning,style,performance,
    /// portability,information,all), comma separated.
    #[arg(long, value_delimiter = ',')]
    enable: Vec<String>,

    /// Report inconclusive findings.
    #[arg(long)]
    inconclusive: bool,

    /// Run only the named checks, comma separated.
    #[arg(long, value_delimiter = ',')]
    checks: Vec<String>,

    /// Honor scrutiny-suppress comments in the sources.
    #[arg(long, default_value_t = true)]
    inline_suppr: bool,

    /// Suppress diagnostics matching id[:file[:line]].
    #[arg(long = "suppress", value_name = "SPEC")]
    suppressions: Vec<String>,

    /// Force the language instead of inferring it from extensions.
    #[arg(long)]
    language: Option<LanguageArg>,

    /// C standard (c89, c99, c11) or C++ standard (c++03, c++11).
    #[arg(long, default_value = "c11")]
    std: String,

    /// Inject worst-case values into externally callable functions.
    #[arg(long)]
    safe_functions: bool,

    /// Load additional settings from a JSON file.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output_format: OutputFormat,

    /// Print verbose messages.
    #[arg(short, long)]
    verbose: bool,

    /// Print per-pass timing at exit.
    #[arg(long)]
    showtime: bool,

    /// Emit debug-severity diagnostics.
    #[arg(long)]
    debug_warnings: bool,
}

fn build_settings(args: &Args) -> Result<Settings, String> {
    let mut settings = match &args.settings {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    settings.jobs = args.jobs;
    settings.max_configs = args.max_configs;
    settings.force = args.force;
    settings.include_paths.extend(args.include_paths.clone());
    settings.defines.extend(args.defines.clone());
    settings.undefines.extend(args.undefines.clone());
    settings.enable.extend(args.enable.iter().cloned());
    settings.inconclusive = args.inconclusive;
    settings.checks.extend(args.checks.iter().cloned());
    settings.inline_suppressions = args.inline_suppr;
    settings.suppressions.extend(args.suppressions.clone());
    settings.verbose = args.verbose;
    settings.show_time = args.showtime;
    settings.debug_warnings = args.debug_warnings;
    settings.safe_functions = args.safe_functions;

    match args.language {
        Some(LanguageArg::C) => settings.language = LanguageMode::C,
        Some(LanguageArg::Cpp) => settings.language = LanguageMode::Cpp,
        None => {}
    }
    if args.std.starts_with("c++") {
        settings.cpp_std = args.std.clone();
    } else {
        settings.c_std = args.std.clone();
    }

    // Validate suppression patterns up front; a typo should fail the run,
    // not silently match nothing.
    let mut probe = Suppressions::new();
    for pattern in &settings.suppressions {
        probe.add_pattern(pattern)?;
    }

    Ok(settings)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let settings = match build_settings(&args) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("scrutiny: {}", message);
            return ExitCode::from(1);
        }
    };
    let show_time = settings.show_time;

    let sink: ConcurrentSink = match args.output_format {
        OutputFormat::Text => {
            ConcurrentSink::new(Box::new(TextSink::new(std::io::stderr(), settings.verbose)))
        }
        OutputFormat::Json => ConcurrentSink::new(Box::new(JsonSink::new(std::io::stdout()))),
    };

    // Write-once cancellation handle; workers poll it at translation-unit
    // boundaries. An embedding driver (or a future signal hook) sets it.
    let terminated = Arc::new(AtomicBool::new(false));

    let ctus: Vec<Ctu> = args
        .files
        .iter()
        .map(|path| Ctu::from_path(path.to_string_lossy().into_owned()))
        .collect();

    let executor = Executor::new(settings, builtin_checks());
    let timers = executor.run(ctus, &sink, &terminated);

    if show_time {
        eprint!("{}", timers.render());
    }

    let errors = sink.error_count().min(u8::MAX as usize) as u8;
    ExitCode::from(errors)
}
