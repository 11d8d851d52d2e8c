//! tabletalk CLI Entry Point
//!
//! Subcommands:
//! - `chat` - Interactive conversation with the configured database
//! - `ask` - A single conversation turn
//! - `tool` - Invoke one catalog tool, print a JSON envelope
//! - `validate` - Print the validator verdict for a statement
//! - `mcp` - MCP server mode (hidden, for AI agent integration)
//!
//! Logs go to stderr. `tool`, `validate` and `ask --json` print JSON only.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dialoguer::Input;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tabletalk::config::DEFAULT_LOG_LEVEL;
use tabletalk::router::REDIRECT_MESSAGE;
use tabletalk::{
    executor_from_config, router_from_config, Config, ErrorEnvelope, Metadata,
    SqlValidator, SuccessEnvelope, TalkError, ToolCall, ValidationVerdict,
};

/// tabletalk - ask questions of a database, read-only
#[derive(Parser)]
#[command(name = "tabletalk")]
#[command(about = "Chat with a relational database through read-only, row-capped tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat,

    /// Answer a single question
    Ask {
        utterance: String,

        /// Print the full turn outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoke one catalog tool
    Tool {
        /// Tool name (get_tables, describe_table, get_all_schemas, count_records, execute_select)
        name: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Validate a SQL statement without running it
    Validate {
        sql: String,

        /// Row ceiling (defaults to the configured max_rows)
        #[arg(long)]
        max_rows: Option<u64>,
    },

    /// Start MCP server (hidden from help, for AI agent integration)
    #[command(hide = true)]
    Mcp,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(DEFAULT_LOG_LEVEL);
            print_json(&ErrorEnvelope::from_error("", command_name(&cli.command), &e));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "tabletalk failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Chat => "chat",
        Commands::Ask { .. } => "ask",
        Commands::Tool { .. } => "tool",
        Commands::Validate { .. } => "validate",
        Commands::Mcp => "mcp",
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "could not serialize output"),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn run(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Validate { sql, max_rows } => Ok(validate(&sql, max_rows, config)),
        Commands::Tool { name, args } => Ok(tool(&name, args.as_deref(), config).await),
        Commands::Ask { utterance, json } => ask(&utterance, json, config).await,
        Commands::Chat => chat(config).await,
        Commands::Mcp => {
            let executor = executor_from_config(config)?;
            let engine = executor.provider().database_type().as_str();
            tabletalk::mcp::McpServer::new(executor, engine).serve().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn validate(sql: &str, max_rows: Option<u64>, config: &Config) -> ExitCode {
    let start = Instant::now();
    let mut validator = SqlValidator::new(config.validator_config());
    if let Some(max_rows) = max_rows {
        validator = validator.capped(max_rows);
    }

    let verdict = validator.validate(sql);
    let accepted = matches!(verdict, ValidationVerdict::Accepted { .. });
    print_json(&SuccessEnvelope::new("", "validate", verdict, Metadata::new(elapsed_ms(start))));

    if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn tool(name: &str, args: Option<&str>, config: &Config) -> ExitCode {
    let start = Instant::now();

    let executor = match executor_from_config(config) {
        Ok(executor) => executor,
        Err(e) => {
            print_json(&ErrorEnvelope::from_error("", name, &e));
            return ExitCode::FAILURE;
        }
    };
    let engine = executor.provider().database_type().as_str();

    let arguments = match args.map(serde_json::from_str::<Value>).transpose() {
        Ok(arguments) => arguments.unwrap_or(Value::Null),
        Err(e) => {
            let err = TalkError::invalid_arguments(format!("--args is not valid JSON: {e}"));
            print_json(&ErrorEnvelope::from_error(engine, name, &err));
            return ExitCode::FAILURE;
        }
    };

    let outcome = match ToolCall::from_invocation(name, &arguments) {
        Ok(call) => executor.execute(&call).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            print_json(&SuccessEnvelope::from_result(engine, name, result, elapsed_ms(start)));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&ErrorEnvelope::from_error(engine, name, &e));
            ExitCode::FAILURE
        }
    }
}

async fn ask(utterance: &str, json: bool, config: &Config) -> Result<ExitCode> {
    let start = Instant::now();
    let mut router = match router_from_config(config) {
        Ok(router) => router,
        Err(e) if json => {
            print_json(&ErrorEnvelope::from_error("", "ask", &e));
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        let engine = router.executor().provider().database_type().as_str();
        let outcome = router.turn(utterance).await;
        print_json(&SuccessEnvelope::new(engine, "ask", outcome, Metadata::new(elapsed_ms(start))));
    } else {
        router.turn_streaming(utterance, print_fragment).await;
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn print_fragment(fragment: &str) {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "{fragment}");
    let _ = stdout.flush();
}

async fn chat(config: &Config) -> Result<ExitCode> {
    let mut router = router_from_config(config)?;
    println!("Connected. Ask about your data, type 'help' for examples or 'quit' to leave.");

    loop {
        let line: String = Input::new().with_prompt("you").allow_empty(true).interact_text()?;
        let utterance = line.trim();

        match utterance.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "bye" => break,
            "help" => {
                println!("{REDIRECT_MESSAGE}");
                continue;
            }
            _ => {}
        }

        router.turn_streaming(utterance, print_fragment).await;
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
