//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `run`      — execute a workflow definition file to completion, in-process.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow JSON file.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use engine::Engine;
use nodes::AgentRegistry;
use tracing::info;

#[derive(Parser)]
#[command(name = "rusty-automation-tool", about = "DAG-based workflow automation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate and then run a workflow DAG file to completion, without a
    /// database — results only go to stdout.
    Run {
        /// Path to a workflow DAG JSON file (the `{ "nodes": [...] }` shape).
        path: std::path::PathBuf,
        /// Path to a JSON file with the initial input, defaults to `{}`.
        #[arg(long)]
        input: Option<std::path::PathBuf>,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow DAG definition JSON file without running it.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
}

/// Built-in agents available without a plugin-loading mechanism (out of
/// scope — see the engine's module docs). `identity` is useful for smoke
/// tests and demos; real deployments register their own agent types here.
fn builtin_registry() -> AgentRegistry {
    let mut registry: AgentRegistry = std::collections::HashMap::new();
    registry.insert("identity".to_string(), Arc::new(nodes::identity::IdentityAgent));
    registry
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, database_url } => {
            info!("Starting API server on {bind}");
            let pool = db::pool::create_pool(&database_url, 10).await.expect("failed to connect to database");
            let journal = Arc::new(db::PgJournal::new(pool.clone()));
            let engine = Engine::new(builtin_registry(), journal);
            api::serve(&bind, pool, engine).await.unwrap();
        }
        Command::Run { path, input } => {
            let dag_json = read_json(&path);
            let input_data = input.map(|p| read_json(&p)).unwrap_or(serde_json::json!({}));

            let journal = engine::InMemoryJournal::shared();
            let eng = Engine::new(builtin_registry(), journal);

            match eng
                .execute_workflow_and_wait(uuid::Uuid::new_v4(), &dag_json, input_data, Default::default())
                .await
            {
                Ok(outcome) => {
                    println!(
                        "execution {} {}",
                        outcome.execution_id,
                        if outcome.succeeded { "succeeded" } else { "failed" }
                    );
                    for report in &outcome.node_reports {
                        println!("  {:<20} {:?} (attempts={})", report.node_id, report.status, report.attempts);
                        if let Some(msg) = &report.error_message {
                            println!("    error: {msg}");
                        }
                    }
                    if !outcome.succeeded {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Migrate { database_url } => {
            info!("Running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await.expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let dag_json = read_json(&path);
            match engine::parse_and_validate(&dag_json) {
                Ok((_, levels)) => {
                    println!("workflow is valid — {} level(s):", levels.len());
                    for (i, level) in levels.iter().enumerate() {
                        println!("  level {i}: {level:?}");
                    }
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid JSON in {}: {e}", path.display()))
}
