pub mod app;
pub mod artifacts;
pub mod cache;
pub mod config;
pub mod github;
pub mod http;
pub mod resolver;
pub mod select;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::App;
use crate::artifacts::{ArtifactError, CiSettings};
use crate::cache::{CachePaths, CheckoutError, PrepareOutcome, repository_exists};
use crate::config::Config;
use crate::types::RepoKey;

#[derive(Parser)]
#[command(
    name = "refmirror",
    about = "Mirror GitHub refs locally and find their CI artifacts"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Cache root (defaults to the system cache dir)
    #[arg(long, global = true, env = "REFMIRROR_ROOT")]
    root: Option<PathBuf>,

    /// GitHub token for private repositories
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// CircleCI API token
    #[arg(long, global = true, env = "CIRCLE_TOKEN", hide_env_values = true)]
    circle_token: Option<String>,

    /// Seconds a checkout stays fresh
    #[arg(long, global = true, env = "REFMIRROR_MAX_AGE")]
    max_age: Option<u64>,

    /// GitHub API base URL
    #[arg(long, global = true, env = "REFMIRROR_API_BASE")]
    api_base: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a repository and check out one ref
    Checkout {
        /// Repository in owner/repo format
        repo: String,
        /// Branch name or commit SHA
        reference: String,
    },

    /// Split a path into a ref and a file path
    Resolve {
        /// Repository in owner/repo format
        repo: String,
        /// Path starting with a branch name or commit SHA
        path: String,
    },

    /// List CI artifacts for a ref
    Artifacts {
        /// Repository in owner/repo format
        repo: String,
        /// Branch name or commit SHA
        reference: String,
        /// Print only the URL serving this path
        path: Option<String>,
    },

    /// Check dependencies
    Doctor,
}

impl GlobalArgs {
    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            root: self.root.unwrap_or(defaults.root),
            api_base: self.api_base.unwrap_or(defaults.api_base),
            github_token: self.github_token,
            max_age: self
                .max_age
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
            ci: CiSettings {
                token: self.circle_token.filter(|t| !t.is_empty()),
                ..defaults.ci
            },
            ..defaults
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.global.into_config();

    let result = match cli.command {
        Commands::Checkout { repo, reference } => cmd_checkout(config, &repo, &reference),
        Commands::Resolve { repo, path } => cmd_resolve(config, &repo, &path),
        Commands::Artifacts {
            repo,
            reference,
            path,
        } => cmd_artifacts(config, &repo, &reference, path.as_deref()),
        Commands::Doctor => cmd_doctor(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(CheckoutError::PrivateRepoAccess) = e.downcast_ref::<CheckoutError>() {
            eprintln!();
            eprintln!("Hint: set GITHUB_TOKEN to a token that can read this repository");
        }
        if e
            .downcast_ref::<ArtifactError>()
            .is_some_and(ArtifactError::is_recoverable)
        {
            eprintln!();
            eprintln!("Hint: the build is still running; try again shortly");
        }
        std::process::exit(1);
    }
}

fn parse_repo(repo: &str) -> Result<RepoKey, Box<dyn std::error::Error>> {
    Ok(repo
        .parse::<RepoKey>()
        .map_err(|e| format!("Invalid repo format: {}", e))?)
}

fn short_sha(commit: &str) -> &str {
    if commit.len() > 12 {
        &commit[..12]
    } else {
        commit
    }
}

fn cmd_checkout(
    config: Config,
    repo: &str,
    reference: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = parse_repo(repo)?;
    let app = App::new(config);

    let prepared = app
        .checkouts
        .prepare_with_outcome(&key, reference, app.token())?;

    println!("{}", prepared.path.display());
    let state = match prepared.outcome {
        PrepareOutcome::Fresh => "fresh",
        PrepareOutcome::Unchanged => "up to date",
        PrepareOutcome::Written => "updated",
    };
    match prepared.commit {
        Some(commit) => eprintln!("  {} ({})", state, short_sha(&commit)),
        None => eprintln!("  {}", state),
    }

    Ok(())
}

fn cmd_resolve(config: Config, repo: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = parse_repo(repo)?;
    let app = App::new(config);

    let (reference, rest) = app.resolver.split(&key, path, app.token())?;

    println!("Ref:  {}", reference.as_deref().unwrap_or("-"));
    println!("Path: {}", rest);

    Ok(())
}

fn cmd_artifacts(
    config: Config,
    repo: &str,
    reference: &str,
    path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = parse_repo(repo)?;
    let app = App::new(config);

    let artifacts = app.locator.locate(&key, reference, app.token())?;

    if let Some(requested) = path {
        let chosen = select::select_path(artifacts.keys().map(String::as_str), requested);
        let url = artifacts
            .get(&chosen)
            .ok_or_else(|| format!("No artifact at {}", chosen))?;
        println!("{}", url);
        return Ok(());
    }

    if artifacts.is_empty() {
        println!("No artifacts");
        return Ok(());
    }

    for (name, url) in &artifacts {
        println!("{:<40} {}", name, url);
    }

    Ok(())
}

fn cmd_doctor(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("refmirror System Check\n");

    // Check git
    let git_ok = std::process::Command::new("git")
        .args(["--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    // Check cache directory
    let paths = CachePaths::new(&config.root);
    let cache_ok = paths.root().exists();
    println!(
        "[{}] Cache dir: {}",
        if cache_ok { "OK" } else { "INFO" },
        paths.root().display()
    );

    let mirrors = std::fs::read_dir(paths.repos_dir())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| repository_exists(&entry.path()))
                .count()
        })
        .unwrap_or(0);
    println!("[INFO] Mirrors: {}", mirrors);

    let checkouts = std::fs::read_dir(paths.checkouts_dir())
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_dir())
                .count()
        })
        .unwrap_or(0);
    println!("[INFO] Checkouts: {}", checkouts);

    println!(
        "[{}] GitHub token: {}",
        if config.token().is_some() { "OK" } else { "INFO" },
        if config.token().is_some() {
            "set"
        } else {
            "not set (public repos only)"
        }
    );
    println!(
        "[{}] CircleCI token: {}",
        if config.ci.token.is_some() { "OK" } else { "INFO" },
        if config.ci.token.is_some() { "set" } else { "not set" }
    );

    if !git_ok {
        return Err("git is required".into());
    }

    Ok(())
}
