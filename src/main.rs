//! Dockyard - dependency-aware orchestration for Docker Compose projects
//!
//! This is the main CLI entry point for Dockyard.

use clap::{Args, Parser, Subcommand};
use dockyard::git::GitOperation;
use dockyard::orchestrator::{AggregateResult, Orchestrator, Resolution, RunOverrides};
use dockyard::project::{ProjectRegistry, TargetSpec, Workspace};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Dockyard - orchestrate many Compose projects
#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Dependency-aware orchestration for Docker Compose projects", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Workspace file (default: search upwards for dockyard.yaml)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Project selection shared by most commands
#[derive(Args)]
struct Selection {
    /// Projects or groups (default: all)
    targets: Vec<String>,
    /// Use the targets of a named environment
    #[arg(short, long, conflicts_with = "targets")]
    env: Option<String>,
}

/// Scheduling flags for commands, hooks and git operations
#[derive(Args)]
struct Scheduling {
    /// Projects or groups (default: the definition's target)
    #[arg(short, long)]
    target: Vec<String>,
    /// Run on all targets concurrently
    #[arg(short, long, conflicts_with = "sequential")]
    parallel: bool,
    /// Run on one target at a time
    #[arg(short, long)]
    sequential: bool,
    /// Keep going after a failure
    #[arg(short = 'k', long)]
    continue_on_error: bool,
}

impl Scheduling {
    fn overrides(&self) -> RunOverrides {
        let parallel = if self.parallel {
            Some(true)
        } else if self.sequential {
            Some(false)
        } else {
            None
        };
        RunOverrides {
            target: TargetSpec::from_names(&self.target),
            parallel,
            continue_on_error: self.continue_on_error,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start projects in dependency order
    Up {
        #[command(flatten)]
        selection: Selection,
    },

    /// Stop projects, dependents first
    Down {
        #[command(flatten)]
        selection: Selection,
    },

    /// Stop then start projects
    Restart {
        #[command(flatten)]
        selection: Selection,
    },

    /// Show the start order
    Order {
        #[command(flatten)]
        selection: Selection,
    },

    /// Run a custom command
    Run {
        /// Command name
        command: String,
        #[command(flatten)]
        scheduling: Scheduling,
    },

    /// Run a hook
    Hook {
        /// Hook name
        name: String,
        #[command(flatten)]
        scheduling: Scheduling,
    },

    /// Git operations across projects
    Git {
        #[command(subcommand)]
        command: GitCommands,
    },

    /// Probe readiness once
    Check {
        #[command(flatten)]
        selection: Selection,
    },

    /// List projects, groups and commands
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum GitCommands {
    /// Show branch, upstream distance and local changes
    Status {
        #[command(flatten)]
        scheduling: Scheduling,
    },
    /// Pull, refusing to overwrite local work
    Pull {
        /// Pull even with uncommitted changes or local commits
        #[arg(short, long)]
        force: bool,
        /// Rebase local commits onto the upstream
        #[arg(short, long)]
        rebase: bool,
        #[command(flatten)]
        scheduling: Scheduling,
    },
    /// Fetch and fast-forward where safe
    Sync {
        #[command(flatten)]
        scheduling: Scheduling,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cwd = std::env::current_dir()?;
    let workspace = Workspace::open(cli.workspace.as_deref(), &cwd)?;
    if let Some(name) = workspace.name() {
        tracing::debug!("Using workspace {}", name);
    }
    let orchestrator = Orchestrator::system(Arc::new(workspace))?;

    let aggregate = match cli.command {
        Commands::Up { selection } => {
            let target = resolve(&orchestrator, &selection)?;
            orchestrator.up(target.as_ref()).await
        }
        Commands::Down { selection } => {
            let target = resolve(&orchestrator, &selection)?;
            orchestrator.down(target.as_ref()).await
        }
        Commands::Restart { selection } => {
            let target = resolve(&orchestrator, &selection)?;
            orchestrator.restart(target.as_ref()).await
        }
        Commands::Order { selection } => {
            let target = resolve(&orchestrator, &selection)?;
            for line in order_lines(&orchestrator.order(target.as_ref())) {
                println!("{}", line);
            }
            return Ok(());
        }
        Commands::Run {
            command,
            scheduling,
        } => {
            orchestrator
                .run_command(&command, &scheduling.overrides())
                .await?
        }
        Commands::Hook { name, scheduling } => {
            orchestrator.run_hook(&name, &scheduling.overrides()).await
        }
        Commands::Git { command } => {
            let (op, scheduling) = match command {
                GitCommands::Status { scheduling } => (GitOperation::Status, scheduling),
                GitCommands::Pull {
                    force,
                    rebase,
                    scheduling,
                } => (GitOperation::Pull { force, rebase }, scheduling),
                GitCommands::Sync { scheduling } => (GitOperation::Sync, scheduling),
            };
            orchestrator.git(op, &scheduling.overrides()).await
        }
        Commands::Check { selection } => {
            let target = resolve(&orchestrator, &selection)?;
            let reports = orchestrator.check(target.as_ref()).await;
            let mut ready = true;
            println!("{:<20} {}", "PROJECT", "READY");
            for report in reports {
                let status = match report.ready {
                    Some(true) => "yes",
                    Some(false) => {
                        ready = false;
                        "no"
                    }
                    None => "-",
                };
                println!("{:<20} {}", report.project, status);
            }
            if !ready {
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::List => {
            list(orchestrator.registry());
            return Ok(());
        }
    };

    if !report(&aggregate) {
        std::process::exit(1);
    }

    Ok(())
}

/// Target named on the command line, or the environment's target
fn resolve(orchestrator: &Orchestrator, selection: &Selection) -> dockyard::Result<Option<TargetSpec>> {
    match selection.env {
        Some(ref env) => orchestrator.environment(env).map(Some),
        None => Ok(TargetSpec::from_names(&selection.targets)),
    }
}

/// Numbered start order; a cycle adds a warning line
fn order_lines(resolution: &Resolution) -> Vec<String> {
    let mut lines: Vec<String> = resolution
        .names()
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{:>3}. {}", i + 1, name))
        .collect();
    if let Some(ref cycle) = resolution.cycle {
        lines.push(format!(
            "warning: dependency cycle between {}, showing declaration order",
            cycle.join(", ")
        ));
    }
    lines
}

/// Print the per-project breakdown; returns the aggregate success
fn report(aggregate: &AggregateResult) -> bool {
    if aggregate.results.is_empty() {
        println!("Nothing to do");
        return aggregate.success;
    }

    for result in &aggregate.results {
        if let Some(ref reason) = result.skipped {
            println!("- {} skipped: {}", result.project, reason);
        } else if result.success {
            println!("✓ {}", result.project);
        } else {
            println!(
                "✗ {}: {}",
                result.project,
                result.error.as_deref().unwrap_or("failed")
            );
        }
        if let Some(ref output) = result.output {
            for line in output.lines() {
                println!("    {}", line);
            }
        }
    }

    let failed = aggregate.failed().len();
    let skipped = aggregate.skipped().len();
    println!(
        "\n{} succeeded, {} failed, {} skipped",
        aggregate.results.len() - failed - skipped,
        failed,
        skipped
    );
    if let Some(ref project) = aggregate.aborted {
        println!("Stopped after failure in {}", project);
    }

    aggregate.success
}

fn list(registry: &dyn ProjectRegistry) {
    println!("{:<20} {:<30} {:<20} {}", "PROJECT", "PATH", "DEPENDS ON", "READINESS");
    for project in registry.projects() {
        let deps = registry
            .dependencies()
            .get(&project.name)
            .map(|d| d.join(","))
            .unwrap_or_default();
        let readiness = project
            .readiness
            .as_ref()
            .map(|r| r.kind.as_str())
            .unwrap_or("-");
        println!(
            "{:<20} {:<30} {:<20} {}",
            project.name, project.path, deps, readiness
        );
    }

    let mut groups: Vec<_> = registry.groups().iter().collect();
    groups.sort();
    if !groups.is_empty() {
        println!("\nGroups:");
        for (name, members) in groups {
            println!("  {}: {}", name, members.join(", "));
        }
    }

    let mut commands: Vec<_> = registry.custom_commands().values().collect();
    commands.sort_by(|a, b| a.name.cmp(&b.name));
    if !commands.is_empty() {
        println!("\nCommands:");
        for spec in commands {
            println!(
                "  {:<18} {}",
                spec.name,
                spec.description.as_deref().unwrap_or(&spec.command)
            );
        }
    }
}
