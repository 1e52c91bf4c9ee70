use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use taskgraph::config::Config;
use taskgraph::{GraphStore, Result, TaskGraph, TaskPlanner, WorkflowTemplate};

/// Taskgraph - build, inspect and validate task dependency graphs
#[derive(Parser, Debug)]
#[command(name = "taskgraph")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TASKGRAPH_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.taskgraph/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the encoded graph for a built-in workflow
    Template {
        /// Workflow to build (interaction or research)
        template: WorkflowTemplate,

        /// Text passed to every task as input
        #[arg(long, short = 'i', default_value = "")]
        input: String,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Audit an encoded graph and list structural problems
    Validate {
        /// Path to an encoded graph
        file: PathBuf,
    },

    /// Print the topological order of an encoded graph
    Order {
        /// Path to an encoded graph
        file: PathBuf,
    },

    /// Print the tasks of an encoded graph that are ready to run
    Ready {
        /// Path to an encoded graph
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    taskgraph::log::init(&config.logging, cli.debug)?;

    match cli.command {
        Command::Template {
            template,
            input,
            pretty,
        } => {
            let planner = TaskPlanner::new(GraphStore::new(), config.engine);
            let graph = planner.build_template(template, &input)?;
            let json = if pretty {
                graph.to_json_pretty()?
            } else {
                graph.to_json()?
            };
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { file } => {
            let issues = load_graph(&file)?.validate();
            if issues.is_empty() {
                println!("ok");
                return Ok(ExitCode::SUCCESS);
            }
            for issue in &issues {
                println!("{}", issue);
            }
            Ok(ExitCode::FAILURE)
        }
        Command::Order { file } => {
            for id in load_graph(&file)?.get_task_order()? {
                println!("{}", id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ready { file } => {
            for id in load_graph(&file)?.get_ready_tasks() {
                println!("{}", id);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_graph(path: &Path) -> Result<TaskGraph> {
    TaskGraph::from_json(&std::fs::read_to_string(path)?)
}
