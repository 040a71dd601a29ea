mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_RECIPE_ERROR, EXIT_STORE_ERROR};
use kiln_core::{Engine, KilnConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Build Emacs Lisp packages from recipes into a local archive and install them"
)]
struct Cli {
    /// Directory holding the archive, build workspaces, and recipes.
    #[arg(long, global = true)]
    root: Option<String>,

    /// Configuration file (default: ~/.config/kiln/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host package manager: emacs or mock.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Build backend: git or mock.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build and install a package and its dependencies.
    Install {
        /// Package name, or a literal recipe such as
        /// '(foo :fetcher github :repo "user/foo")'.
        package: String,
    },
    /// Rebuild the archive index from the artifacts on disk.
    Index,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<KilnConfig, String> {
    let mut config = match &cli.config {
        Some(path) => KilnConfig::load(path),
        None => KilnConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(root) = &cli.root {
        config.root = Some(expand_tilde(root));
    }
    if let Some(host) = &cli.host {
        host.clone_into(&mut config.host);
    }
    if let Some(backend) = &cli.backend {
        backend.clone_into(&mut config.backend);
    }
    Ok(config)
}

fn check_prereqs(config: &KilnConfig) -> Result<(), String> {
    if std::env::var("KILN_SKIP_PREREQS").as_deref() == Ok("1") {
        return Ok(());
    }
    let mut missing = Vec::new();
    if config.backend == "git" {
        missing.extend(kiln_runtime::check_git_prereqs());
    }
    if config.host == "emacs" {
        missing.extend(kiln_runtime::check_emacs_prereqs(&config.emacs));
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(kiln_runtime::format_missing(&missing))
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KILN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let result = match &cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(*shell),
        Commands::Install { package } => load_config(&cli).and_then(|config| {
            check_prereqs(&config)?;
            let mut engine = Engine::from_config(config).map_err(|e| e.to_string())?;
            commands::install::run(&mut engine, package, json_output)
        }),
        Commands::Index => load_config(&cli).and_then(|config| {
            let engine = Engine::from_config(config).map_err(|e| e.to_string())?;
            commands::index::run(&engine, json_output)
        }),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("no recipe for package")
        || msg.starts_with("recipe error:")
        || msg.starts_with("recipe file for")
    {
        EXIT_RECIPE_ERROR
    } else if msg.starts_with("store error:") {
        EXIT_STORE_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
