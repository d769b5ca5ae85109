//! comptest command line
//!
//! Lists affected components, inspects the dependency graph and resource
//! analysis, merges component tests and splits them into CI batches.
//! Results go to stdout; logs go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use comptest_config::ToolSettings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "comptest")]
#[command(version)]
#[command(about = "Component test dependency resolution, grouping and batching")]
struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Settings file (defaults to comptest.yaml under the root)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List components, or those affected by changed files
    ListComponents(ListArgs),
    /// Show the component dependency graph
    Graph(GraphArgs),
    /// Show resource analysis and classification
    Analyze(AnalyzeArgs),
    /// Merge component tests into one document
    Merge(MergeArgs),
    /// Split components into weighted CI batches
    Split(SplitArgs),
    /// Plan grouped builds and write their artifacts
    Plan(PlanArgs),
}

#[derive(Args)]
struct ListArgs {
    /// List only components affected by the changed files
    #[arg(long)]
    changed: bool,

    /// Leave out components that depend on the changed ones
    #[arg(long, requires = "changed")]
    direct_only: bool,

    /// Changed files (read from stdin when none are given)
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct GraphArgs {
    /// Print the components that depend on NAME
    #[arg(long, value_name = "NAME")]
    dependents_of: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Components to show (comma separated, all when omitted)
    #[arg(short, long, value_delimiter = ',')]
    components: Vec<String>,

    /// Only show test targets starting with this
    #[arg(short = 'p', long = "platform", value_name = "TARGET")]
    target: Option<String>,

    /// Show the grouping plan instead of per-component findings
    #[arg(long)]
    group: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Components to merge, in order (comma separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    components: Vec<String>,

    /// Test target, e.g. esp32-idf
    #[arg(short = 'p', long = "platform", value_name = "TARGET")]
    target: String,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SplitFormat {
    Json,
    Github,
}

#[derive(Args)]
struct SplitArgs {
    /// JSON array of component names
    #[arg(short, long, value_name = "JSON")]
    components: String,

    /// Weighted batch size target (defaults to the configured size)
    #[arg(short, long)]
    batch_size: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = SplitFormat::Github)]
    output: SplitFormat,
}

#[derive(Args)]
struct PlanArgs {
    /// Components to plan (comma separated, all when omitted)
    #[arg(short, long, value_delimiter = ',')]
    components: Vec<String>,

    /// Only plan test targets starting with this
    #[arg(short, long, value_name = "TARGET")]
    target: Option<String>,

    /// Build every component test on its own
    #[arg(long)]
    no_grouping: bool,

    /// Never group these components (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "COMPONENTS")]
    isolate: Vec<String>,

    /// Keep going after a merge failure
    #[arg(short = 'f', long)]
    continue_on_fail: bool,

    /// Directory for written artifacts (defaults to the configured build dir)
    #[arg(long, value_name = "DIR")]
    build_dir: Option<PathBuf>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("warn,comptest={level}"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let root = if cli.root.is_absolute() {
        cli.root
    } else {
        std::env::current_dir()
            .context("failed to resolve the working directory")?
            .join(&cli.root)
    };
    let settings = load_settings(&root, cli.config.as_deref())?;

    match cli.command {
        Command::ListComponents(args) => commands::list_components(&root, &settings, args),
        Command::Graph(args) => commands::graph(&settings, args),
        Command::Analyze(args) => commands::analyze(&settings, args),
        Command::Merge(args) => commands::merge(&settings, args),
        Command::Split(args) => commands::split(&settings, args),
        Command::Plan(args) => commands::plan(settings, args),
    }
}

fn load_settings(root: &std::path::Path, config: Option<&std::path::Path>) -> Result<ToolSettings> {
    let Some(path) = config else {
        return ToolSettings::load(root).with_context(|| format!("failed to load settings under {}", root.display()));
    };

    let mut settings = ToolSettings::from_file(path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?
        .with_root(root);
    settings.apply_overrides(|key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from(["comptest", "plan", "-c", "bme280,bh1750", "-t", "esp32", "-f", "--isolate", "lvgl"])
            .unwrap();
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.components, vec!["bme280", "bh1750"]);
        assert_eq!(args.target.as_deref(), Some("esp32"));
        assert!(args.continue_on_fail);
        assert_eq!(args.isolate, vec!["lvgl"]);
    }

    #[test]
    fn test_merge_requires_target() {
        assert!(Cli::try_parse_from(["comptest", "merge", "-c", "a,b"]).is_err());
    }

    #[test]
    fn test_direct_only_requires_changed() {
        assert!(Cli::try_parse_from(["comptest", "list-components", "--direct-only"]).is_err());
        assert!(Cli::try_parse_from(["comptest", "list-components", "--changed", "--direct-only"]).is_ok());
    }
}
