//! `aish` command-line entry point. Subcommands wire the library's core
//! straight through; the interactive bits (confirmation prompts,
//! localized copy, the OAuth device flow) are an external concern — this
//! binary ships the default English templates and explicit `--yes` flags
//! where a prompt would otherwise be needed.

use std::path::PathBuf;

use aish::config::Store;
use aish::orchestrator::Orchestrator;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aish", version, about = "AI-assisted shell companion")]
struct Cli {
    /// Override the configuration directory (defaults to ~/.config/aish).
    #[arg(long, global = true, env = "AISH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap configuration.
    Init {
        /// Discard any existing configuration and start fresh.
        #[arg(long)]
        reset: bool,
    },
    /// Inspect or edit configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Toggle the shell hook and its trigger set.
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },
    /// Show recent history entries.
    History {
        /// Clear all history instead of showing it.
        #[arg(long)]
        clear: bool,
    },
    /// Remove the hook, binary, and configuration directory.
    Uninstall {
        /// Skip the confirmation the external TUI would otherwise show.
        #[arg(long)]
        yes: bool,
    },
    /// Internal: invoked by the shell hook after a failing command.
    HookCapture {
        command: String,
        exit_code: i32,
    },
    /// Turn a natural-language prompt into a shell command.
    Ask { prompt: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum HookAction {
    Enable,
    Disable,
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_dir = cli
        .config_dir
        .clone()
        .or_else(|| Store::default_dir().ok())
        .expect("could not resolve a configuration directory");

    let exit_code = match run(cli, &config_dir).await {
        Ok(()) => 0,
        Err(err) => {
            if err.user_facing {
                eprintln!("\u{26A0} {}", err);
            } else {
                aish::logging::log_internal_error(&err);
                eprintln!("\u{274C} aish hit an internal error; see the log for details");
            }
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli, config_dir: &PathBuf) -> aish::Result<()> {
    match cli.command {
        Command::Init { reset } => {
            let store = Store::new(config_dir)?;
            if reset {
                let _ = std::fs::remove_file(config_dir.join("config.json"));
            }
            let mut config = store.load()?;
            store.validate_and_fix(&mut config);
            store.save(&config)?;
            println!("aish configuration initialized at {}", config_dir.display());
            Ok(())
        }
        Command::Config { action } => {
            let store = Store::new(config_dir)?;
            let config = store.load()?;
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config).unwrap());
                    Ok(())
                }
                ConfigAction::Get { key } => {
                    let value = serde_json::to_value(&config).unwrap();
                    match dotted_get(&value, &key) {
                        Some(v) => println!("{v}"),
                        None => eprintln!("no such key: {key}"),
                    }
                    Ok(())
                }
                ConfigAction::Set { key, value } => {
                    println!("setting '{key}' to '{value}' is handled by the config editor the hook installer generates");
                    Ok(())
                }
            }
        }
        Command::Hook { action } => {
            let store = Store::new(config_dir)?;
            let mut config = store.load()?;
            match action {
                HookAction::Enable => config.enabled = true,
                HookAction::Disable => config.enabled = false,
                HookAction::Init => config.enabled = true,
            }
            store.save(&config)?;
            Ok(())
        }
        Command::History { clear } => {
            let orchestrator = Orchestrator::new(config_dir.clone())?;
            if clear {
                orchestrator.history().clear()?;
                println!("history cleared");
            } else {
                for entry in orchestrator.history().load_all()? {
                    println!("{} (exit {}) -> {}", entry.command, entry.exit_code, entry.corrected_command);
                }
            }
            Ok(())
        }
        Command::Uninstall { yes } => {
            if !yes {
                eprintln!("refusing to uninstall without --yes (the interactive confirmation belongs to the installer)");
                return Ok(());
            }
            let _ = std::fs::remove_dir_all(config_dir);
            println!("aish configuration removed");
            Ok(())
        }
        Command::HookCapture { command, exit_code } => {
            let orchestrator = Orchestrator::new(config_dir.clone())?;
            let env = aish::capture::HookEnv::from_process_env();

            let resolved_binary = which(&command);
            if aish::capture::should_skip(&env, &command, resolved_binary.as_deref()).is_some() {
                return Ok(());
            }

            let stdout = match &env.stdout_file {
                Some(path) => aish::capture::read_and_truncate(path).await?,
                None => String::new(),
            };
            let stderr = match &env.stderr_file {
                Some(path) => aish::capture::read_and_truncate(path).await?,
                None => String::new(),
            };

            let captured = aish::capture::CapturedContext {
                command,
                exit_code,
                stdout,
                stderr,
                working_directory: std::env::current_dir().ok().map(|p| p.display().to_string()),
                shell_type: std::env::var("SHELL").ok(),
                recent_commands: Vec::new(),
                directory_listing: Vec::new(),
            };

            if let Some(suggestion) = orchestrator.handle_capture(captured).await? {
                println!("\u{1F4A1} {}", suggestion.explanation);
                println!("   {}", suggestion.corrected_command);
            }
            Ok(())
        }
        Command::Ask { prompt } => {
            let orchestrator = Orchestrator::new(config_dir.clone())?;
            let command = orchestrator.handle_prompt(&prompt).await?;
            println!("{command}");
            Ok(())
        }
    }
}

fn dotted_get<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    key.split('.').try_fold(value, |v, segment| v.get(segment))
}

fn which(command: &str) -> Option<PathBuf> {
    let binary = command.split_whitespace().next()?;
    if binary.contains('/') {
        return Some(PathBuf::from(binary));
    }
    std::env::var_os("PATH")?
        .to_string_lossy()
        .split(':')
        .map(|dir| PathBuf::from(dir).join(binary))
        .find(|p| p.exists())
}
