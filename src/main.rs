use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lookout_core::{LookoutConfig, LookoutError, OutputFormat, PrRef, PullRequestDiff};
use lookout_review::github::GitHubClient;
use lookout_review::llm::{has_model, ModelBackend, OllamaClient};
use lookout_review::pipeline::{review_diff, ReviewOutcome, ReviewPipeline};

const CONFIG_FILE: &str = ".lookout.toml";

#[derive(Parser)]
#[command(
    name = "lookout",
    version,
    about = "Pull request reviews from a local Ollama model",
    long_about = "lookout fetches a pull request from GitHub, asks a locally hosted model\n\
                   (Ollama) to review it, and posts the Summary, Issues Found and Suggestions\n\
                   sections back as PR comments.\n\n\
                   Examples:\n  \
                     lookout review --pr owner/repo#12          Review and comment on a PR\n  \
                     lookout review --pr owner/repo#12 --dry-run  Print the review only\n  \
                     git diff main | lookout review --diff-file -  Review a local diff\n  \
                     lookout serve                              Start the HTTP surface\n  \
                     lookout doctor                             Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .lookout.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request and post the result as comments
    #[command(long_about = "Review a pull request and post the result as comments.\n\n\
        Fetches the PR's changed files, builds a prompt within the configured character\n\
        budget, asks the model for a review, and posts each non-empty section as one\n\
        comment. A failed post is reported and skipped.\n\n\
        Exit codes: 0 success or dry run, 1 fetch/model failure, 2 some comments not posted.\n\n\
        Examples:\n  lookout review --repo owner/repo --pr-number 12\n  lookout review --pr owner/repo#12 --model mistral\n  lookout review --diff-file changes.patch")]
    Review {
        /// Repository as owner/repo
        #[arg(long, env = "GITHUB_REPOSITORY")]
        repo: Option<String>,
        /// Pull request number
        #[arg(long, env = "PR_NUMBER")]
        pr_number: Option<u64>,
        /// Pull request as owner/repo#number (overrides --repo and --pr-number)
        #[arg(long)]
        pr: Option<String>,
        /// GitHub token (default: $GITHUB_TOKEN, then $GH_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Model name to use
        #[arg(long)]
        model: Option<String>,
        /// Ollama endpoint URL
        #[arg(long)]
        endpoint: Option<String>,
        /// Prompt size limit in characters
        #[arg(long)]
        prompt_budget: Option<usize>,
        /// Model deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the review without posting comments
        #[arg(long)]
        dry_run: bool,
        /// Review a local unified diff instead of fetching (use - for stdin); implies --dry-run
        #[arg(long)]
        diff_file: Option<PathBuf>,
    },
    /// Start the HTTP surface
    #[command(long_about = "Start the HTTP surface.\n\n\
        Serves GET /health, GET /models, GET /demo-review, POST /review and GET /docs.\n\
        Stops on Ctrl-C.")]
    Serve {
        /// Address to listen on (default: [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create a default .lookout.toml configuration file
    #[command(long_about = "Create a default .lookout.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .lookout.toml already exists.")]
    Init,
    /// Check your lookout setup and environment
    #[command(long_about = "Check your lookout setup and environment.\n\n\
        Checks the config file, GitHub token, Ollama reachability and whether the\n\
        configured model is pulled. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[36m◉\x1b[0m \x1b[1mlookout\x1b[0m v{version}: pull request reviews from a local model\n");
        println!("Commands:");
        println!("  \x1b[32mreview\x1b[0m   Review a PR and post the result as comments");
        println!("  \x1b[32mserve\x1b[0m    Start the HTTP surface");
        println!("  \x1b[32mdoctor\x1b[0m   Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m     Create default configuration\n");
    } else {
        println!("lookout v{version}: pull request reviews from a local model\n");
        println!("Commands:");
        println!("  review   Review a PR and post the result as comments");
        println!("  serve    Start the HTTP surface");
        println!("  doctor   Check your setup and environment");
        println!("  init     Create default configuration\n");
    }

    println!("Run 'lookout <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,lookout={level},lookout_core={level},lookout_review={level},lookout_server={level},tower_http={level}"
        ))
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LookoutConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(LookoutError::FileNotFound(path.to_path_buf()).into());
            }
            LookoutConfig::from_file(path)?
        }
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                LookoutConfig::from_file(default_path)?
            } else {
                LookoutConfig::default()
            }
        }
    };
    Ok(config)
}

fn read_diff_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .into_diagnostic()
            .wrap_err("reading stdin")?;
        return Ok(input);
    }
    if !path.exists() {
        return Err(LookoutError::FileNotFound(path.to_path_buf()).into());
    }
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err(format!("reading {}", path.display()))
}

/// Pick the pull request from `--pr`, else `--repo`/`--pr-number`, else config.
fn resolve_pr(
    pr: Option<&str>,
    repo: Option<&str>,
    pr_number: Option<u64>,
    config: &LookoutConfig,
) -> std::result::Result<PrRef, LookoutError> {
    if let Some(pr) = pr {
        return pr.parse();
    }
    let repository = repo
        .map(str::to_string)
        .or_else(|| config.github.repository.clone())
        .ok_or_else(|| {
            LookoutError::Config(
                "no repository given; pass --pr owner/repo#N or --repo (or set GITHUB_REPOSITORY)"
                    .into(),
            )
        })?;
    let number = pr_number.ok_or_else(|| {
        LookoutError::Config("no pull request number given; pass --pr-number (or set PR_NUMBER)".into())
    })?;
    PrRef::from_repository(&repository, number)
}

fn spinner(enabled: bool, message: &'static str) -> Option<indicatif::ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn print_outcome(outcome: &ReviewOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", outcome.to_markdown()),
        OutputFormat::Text => print!("{outcome}"),
    }
    Ok(())
}

fn stage_failure(err: LookoutError) -> miette::Report {
    let stage = err.stage();
    miette::Report::new(err).wrap_err(format!("review failed at the {stage} stage"))
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

async fn run_doctor(
    config: &LookoutConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found", config_path.display()),
            "run 'lookout init' to create a default config",
        ));
    }

    match &config.github.repository {
        Some(repo) => checks.push(CheckResult::info("repository", repo.clone())),
        None => checks.push(CheckResult::info(
            "repository",
            "not configured; pass --repo or set GITHUB_REPOSITORY",
        )),
    }

    match GitHubClient::from_config(&config.github, None) {
        Ok(client) => match client.current_user().await {
            Ok(login) => checks.push(CheckResult::pass(
                "github_token",
                format!("authenticated as {login}"),
            )),
            Err(e) => checks.push(CheckResult::fail(
                "github_token",
                e.to_string(),
                "check the token is valid and has repo scope",
            )),
        },
        Err(_) => checks.push(CheckResult::fail(
            "github_token",
            format!("{} not set", config.github.token_env),
            format!("export {}=<token> (or GH_TOKEN)", config.github.token_env),
        )),
    }

    let ollama = OllamaClient::new(&config.model)?;
    match ollama.list_models().await {
        Ok(models) => {
            checks.push(CheckResult::pass(
                "ollama",
                format!("reachable at {} ({} models)", ollama.endpoint(), models.len()),
            ));
            if has_model(&models, &config.model.name) {
                checks.push(CheckResult::pass("model", config.model.name.clone()));
            } else {
                checks.push(CheckResult::fail(
                    "model",
                    format!("{} not pulled", config.model.name),
                    format!("run 'ollama pull {}'", config.model.name),
                ));
            }
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "ollama",
                e.to_string(),
                "install Ollama and run 'ollama serve'",
            ));
            checks.push(CheckResult::info(
                "model",
                format!("{} (not checked)", config.model.name),
            ));
        }
    }

    checks.push(CheckResult::info(
        "prompt_budget",
        format!("{} characters", config.review.prompt_char_budget),
    ));

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("lookout v{version}: environment check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# lookout configuration

[github]
# repository = "owner/repo"
# Environment variable holding the access token (GH_TOKEN is tried next)
# token_env = "GITHUB_TOKEN"
# api_url = "https://api.github.com"

[model]
# endpoint = "http://localhost:11434"
# name = "llama3.2"
# timeout_ms = 60000
# temperature = 0.7
# top_p = 0.9
# max_tokens = 2000

[review]
# Maximum prompt size in characters; trailing files are dropped past it
# prompt_char_budget = 24000

[server]
# bind = "0.0.0.0:8000"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Review {
            ref repo,
            pr_number,
            ref pr,
            ref token,
            ref model,
            ref endpoint,
            prompt_budget,
            timeout_ms,
            dry_run,
            ref diff_file,
        }) => {
            if let Some(model) = model {
                config.model.name = model.clone();
            }
            if let Some(endpoint) = endpoint {
                config.model.endpoint = endpoint.clone();
            }
            if let Some(budget) = prompt_budget {
                config.review.prompt_char_budget = budget;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.model.timeout_ms = timeout_ms;
            }
            tracing::debug!(model = %config.model.name, endpoint = %config.model.endpoint, "configuration loaded");

            let ollama = Arc::new(OllamaClient::new(&config.model)?);
            let show_spinner = std::io::stderr().is_terminal() && !cli.verbose;

            let outcome = if let Some(path) = diff_file {
                let input = read_diff_input(path)?;
                let files = lookout_review::diff::parse_unified_diff(&input)?;
                let pr = match pr {
                    Some(pr) => pr.parse::<PrRef>()?,
                    None => PrRef {
                        owner: "local".into(),
                        repo: "diff".into(),
                        number: 0,
                    },
                };
                let diff = PullRequestDiff {
                    pr,
                    title: path.display().to_string(),
                    body: None,
                    files,
                };

                let pb = spinner(show_spinner, "Reviewing diff...");
                let result = review_diff(ollama.as_ref(), &diff, config.review.prompt_char_budget).await;
                if let Some(pb) = pb {
                    pb.finish_and_clear();
                }
                result.map_err(stage_failure)?
            } else {
                let pr = resolve_pr(pr.as_deref(), repo.as_deref(), pr_number, &config)?;
                let hosting = Arc::new(
                    GitHubClient::from_config(&config.github, token.as_deref())
                        .map_err(stage_failure)?,
                );
                let pipeline = ReviewPipeline::new(hosting, ollama.clone(), &config.review);

                let pb = spinner(show_spinner, "Reviewing pull request...");
                let result = pipeline.run(&pr, dry_run).await;
                if let Some(pb) = pb {
                    pb.finish_and_clear();
                }
                result.map_err(stage_failure)?
            };

            print_outcome(&outcome, cli.format)?;

            let code = outcome.exit_code();
            if code != 0 {
                if let Some(report) = &outcome.posting {
                    eprintln!("warning: {report}");
                }
                std::process::exit(code);
            }
        }
        Some(Command::Serve { ref bind }) => {
            let bind = bind.clone().unwrap_or_else(|| config.server.bind.clone());
            lookout_server::serve(&config, &bind).await?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            run_doctor(&config, &path, cli.format, use_color).await?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lookout", &mut std::io::stdout());
        }
    }

    Ok(())
}
