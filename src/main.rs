//! Convoy CLI - run a release submission plan

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use convoy::{
    ConvoyError, FileCache, FixSuggestion, JobReport, JobState, Options, Plan, Presenter,
    Result, RunReport, Runner, ScriptedPresenter, TerminalPresenter,
};

#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Convoy - job-dependency orchestration for release submissions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan file
    Run {
        /// Path to the plan YAML file
        plan: PathBuf,

        /// Run only this job and its dependencies; nothing is submitted
        #[arg(short, long)]
        isolate: Option<String>,

        /// Do not replay cached job results
        #[arg(long)]
        ignore_cache: bool,

        /// Answer prompts from a YAML file instead of the terminal
        #[arg(short, long)]
        answers: Option<PathBuf>,

        /// Config file (default: ~/.config/convoy/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Option value, repeatable (KEY=VALUE)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,

        /// Write the event log as JSON to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Validate a plan file (parse and build the job graph)
    Check {
        /// Path to the plan YAML file
        plan: PathBuf,
    },

    /// Print the jobs of a plan with their prejobs
    Graph {
        /// Path to the plan YAML file
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            plan,
            isolate,
            ignore_cache,
            answers,
            config,
            values,
            events,
        } => {
            let args = RunArgs {
                isolate,
                ignore_cache,
                answers,
                config,
                values,
                events,
            };
            run_plan(&plan, args).await
        }
        Commands::Check { plan } => check_plan(&plan).await,
        Commands::Graph { plan } => print_graph(&plan).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

struct RunArgs {
    isolate: Option<String>,
    ignore_cache: bool,
    answers: Option<PathBuf>,
    config: Option<PathBuf>,
    values: Vec<String>,
    events: Option<PathBuf>,
}

fn load_options(args: &RunArgs) -> Result<Options> {
    let mut options = match &args.config {
        Some(path) => Options::load_from(path)?,
        None => Options::load()?,
    }
    .with_env();

    if let Some(job) = &args.isolate {
        options = options.with_isolate(job.clone());
    }
    if args.ignore_cache {
        options = options.with_ignore_cache(true);
    }
    for pair in &args.values {
        let (key, value) = pair.split_once('=').ok_or_else(|| ConvoyError::ConfigError {
            reason: format!("Expected KEY=VALUE, got '{}'", pair),
        })?;
        options = options.with_value(key.trim(), parse_value(value));
    }
    Ok(options)
}

/// `true`, `42` and `[a, b]` keep their YAML type; anything else is a string
fn parse_value(raw: &str) -> Value {
    serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn run_plan(path: &Path, args: RunArgs) -> Result<()> {
    let options = load_options(&args)?;
    let cache_dir = options.effective_cache_dir();

    let plan = Plan::load(path).await?;
    println!(
        "{} Plan '{}' | {} jobs | cache: {}",
        "→".cyan(),
        plan.name.cyan().bold(),
        plan.jobs.len(),
        cache_dir.display().to_string().cyan()
    );

    let (pipeline, payload_plan) = plan.into_pipeline(options)?;
    if pipeline.is_isolated() {
        println!(
            "{} Isolated run: {}",
            "→".cyan(),
            pipeline
                .isolated_jobs()
                .iter()
                .map(|name| name.as_ref())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let presenter: Arc<dyn Presenter> = match &args.answers {
        Some(file) => Arc::new(ScriptedPresenter::from_file(file).await?),
        None => Arc::new(TerminalPresenter),
    };

    let runner = Runner::new(pipeline).with_cache(Arc::new(FileCache::new(cache_dir)));
    let result = runner.run(presenter).await;

    if let Some(events) = &args.events {
        let json = serde_json::to_string_pretty(&runner.event_log().to_json())?;
        tokio::fs::write(events, json).await?;
    }

    let report = result?;
    print_report(&report);

    if report.submission_ok {
        let pipeline = runner.pipeline();
        let payload = payload_plan.assemble(&pipeline.harvester(), pipeline.options())?;
        println!("{}", "Payload:".cyan().bold());
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !runner.pipeline().is_isolated() {
        println!("{} Submission skipped: not every job succeeded", "✗".red());
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    for job in &report.jobs {
        print_job(job);
    }
    println!(
        "{} {} jobs in {}ms",
        "→".cyan(),
        report.jobs.len(),
        report.duration_ms
    );
}

fn print_job(job: &JobReport) {
    let marker = match job.state {
        JobState::Finished if job.exit_code == Some(0) => "✓".green(),
        JobState::Finished => "!".yellow(),
        JobState::Skipped => "-".dimmed(),
        _ => "✗".red(),
    };
    let mut line = format!("{} {}", marker, job.label.bold());
    if job.cached {
        line.push_str(&format!(" {}", "(cached)".dimmed()));
    }
    if !job.output.is_empty() {
        line.push_str(&format!(": {}", job.output.join(", ")));
    }
    println!("{}", line);
    for warning in &job.warnings {
        println!("    {} {}", "warning:".yellow(), warning);
    }
    for error in &job.errors {
        println!("    {} {}", "error:".red(), error);
    }
}

async fn check_plan(path: &Path) -> Result<()> {
    let plan = Plan::load(path).await?;
    let name = plan.name.clone();
    let (pipeline, payload_plan) = plan.into_pipeline(Options::default())?;

    println!("{} Plan '{}' is valid", "✓".green(), path.display());
    println!("  Name: {}", name);
    println!("  Jobs: {}", pipeline.jobs_before_upload().len());
    println!("  Payload fields: {}", payload_plan.common.len());
    println!(
        "  Branch: {}",
        if payload_plan.branch.is_some() { "yes" } else { "no" }
    );
    Ok(())
}

async fn print_graph(path: &Path) -> Result<()> {
    let plan = Plan::load(path).await?;
    let (pipeline, _) = plan.into_pipeline(Options::default())?;
    let graph = pipeline.graph();

    for name in pipeline.jobs_before_upload() {
        let prejobs = graph.prejobs(name);
        if prejobs.is_empty() {
            println!("{}", name.bold());
            continue;
        }
        let prejobs: Vec<&str> = prejobs.iter().map(|p| p.as_ref()).collect();
        println!("{} {} {}", name.bold(), "←".dimmed(), prejobs.join(", "));

        let closure = graph.job_and_dependencies(name, &[])?;
        let needs: Vec<&str> = closure
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| *n != name.as_ref())
            .collect();
        println!("    {} {}", "needs:".dimmed(), needs.join(", "));
    }
    Ok(())
}
