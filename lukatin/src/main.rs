//! `lukatin` command-line entry point.
//!
//! Without a subcommand, starts the interactive REPL. `bash` and `tool` run a
//! single call headlessly and print its result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use lukatin::exit_codes;
use lukatin::io::config::{DEFAULT_CONFIG_PATH, LukatinConfig, load_config, write_config};
use lukatin::io::dispatcher::CommandInvocation;
use lukatin::logging;
use lukatin::repl::Repl;
use lukatin::tools::{ToolCall, Toolbox};

#[derive(Parser)]
#[command(
    name = "lukatin",
    version,
    about = "Coding-assistant shell with a persistent command session and reviewed edits"
)]
struct Cli {
    /// Config file (defaults to `.lukatin/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: run tools and review edits (default).
    Repl,
    /// Run one shell command and print the JSON result.
    Bash {
        command: String,
        /// Human-readable description of the command.
        #[arg(long)]
        description: Option<String>,
        /// Timeout in milliseconds (0 uses the configured default).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Run one JSON tool call without review (edits are auto-approved).
    Tool {
        /// e.g. `{"tool":"Read","file_path":"/abs/path"}`
        call: String,
    },
    /// Write the default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init()?;
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match cli.command.unwrap_or(Command::Repl) {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Repl => block_on(cmd_repl(load_config(&config_path)?)),
        Command::Bash {
            command,
            description,
            timeout_ms,
        } => {
            let mut invocation = CommandInvocation::new(command);
            invocation.description = description;
            invocation.timeout_ms = timeout_ms;
            block_on(cmd_bash(load_config(&config_path)?, invocation))
        }
        Command::Tool { call } => block_on(cmd_tool(load_config(&config_path)?, call)),
    }
}

fn block_on(future: impl Future<Output = Result<i32>>) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let result = runtime.block_on(future);
    // A pending stdin read stays parked on a blocking thread.
    runtime.shutdown_background();
    result
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &LukatinConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_repl(config: LukatinConfig) -> Result<i32> {
    let repl = Repl::new(&config, std::io::stdout());
    repl.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(exit_codes::OK)
}

async fn cmd_bash(config: LukatinConfig, invocation: CommandInvocation) -> Result<i32> {
    let toolbox = Toolbox::new(&config, None);
    let response = toolbox.dispatcher().dispatch(&invocation).await;
    toolbox.shutdown().await;
    println!("{}", response.to_json());
    Ok(if response.is_success() {
        exit_codes::OK
    } else {
        exit_codes::TOOL_FAILED
    })
}

async fn cmd_tool(config: LukatinConfig, raw: String) -> Result<i32> {
    let call = ToolCall::parse(&raw)?;
    let toolbox = Toolbox::new(&config, None);
    let result = toolbox.invoke(&call).await;
    toolbox.shutdown().await;
    println!("{result}");
    Ok(exit_codes::OK)
}
