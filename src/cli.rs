//! Command-line surface mapping 1:1 onto the query and mutation layers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use proc_exit::{Code, Exit, ExitResult};

use crate::cancel::Token;
use crate::collector::Scope;
use crate::event::{Event, EventKind};
use crate::mutator::{Mutator, Plan};
use crate::query;
use crate::registry::Registry;
use crate::state::{HistoryRow, Marker, RegistryState};
use crate::version::BumpPart;
use crate::Error;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    logging: clap_verbosity_flag::Verbosity,
    /// Path inside the repository to operate on
    #[arg(short, long, default_value = ".", global = true)]
    repo: PathBuf,
    /// Undecorated output: no colors, no emojis
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an artifact version
    Register {
        /// Artifact name
        artifact: String,
        /// Version to register; computed by bumping when omitted
        #[arg(long)]
        version: Option<String>,
        /// Commitish to register at [default: HEAD]
        #[arg(long = "ref")]
        reference: Option<String>,
        /// Version part to bump when computing the next version
        #[arg(long, value_enum)]
        bump: Option<BumpPart>,
        /// Register even while the artifact is deprecated
        #[arg(long)]
        force: bool,
    },
    /// Withdraw a registered version
    Deregister {
        /// Artifact name
        artifact: String,
        /// Version to withdraw
        version: String,
        /// Delete every tag touching the version instead
        #[arg(long)]
        delete: bool,
    },
    /// Assign a stage to a version or a commit
    Assign {
        /// Artifact name
        artifact: String,
        /// Stage label
        stage: String,
        /// Version to promote
        #[arg(long, conflicts_with = "reference")]
        version: Option<String>,
        /// Commitish to promote, registering a version when none exists
        #[arg(long = "ref")]
        reference: Option<String>,
        /// Version part to bump for an implicit registration
        #[arg(long, value_enum)]
        bump: Option<BumpPart>,
    },
    /// Withdraw a stage assignment
    Unassign {
        /// Artifact name
        artifact: String,
        /// Stage label
        stage: String,
        /// Version to demote; defaults to the most recently assigned one
        #[arg(long)]
        version: Option<String>,
        /// Delete every tag touching the stage instead
        #[arg(long)]
        delete: bool,
    },
    /// Deprecate an artifact as a whole
    Deprecate {
        /// Artifact name
        artifact: String,
        /// Delete every tag of the artifact instead
        #[arg(long)]
        delete: bool,
    },
    /// Attach a free-text note to an artifact
    Annotate {
        /// Artifact name
        artifact: String,
        /// The note text
        #[arg(short, long)]
        message: String,
    },
    /// Overview of the registry, or the versions of one artifact
    Show {
        /// Artifact to list versions for
        artifact: Option<String>,
        /// Include deregistered versions
        #[arg(long)]
        all: bool,
        /// Read the index at every branch tip
        #[arg(long, conflicts_with = "all_commits")]
        all_branches: bool,
        /// Read the index at every commit
        #[arg(long)]
        all_commits: bool,
    },
    /// Event history in display order
    History {
        /// Restrict to one artifact
        artifact: Option<String>,
        /// Read the index at every branch tip
        #[arg(long, conflicts_with = "all_commits")]
        all_branches: bool,
        /// Read the index at every commit
        #[arg(long)]
        all_commits: bool,
    },
    /// Greatest registered, non-deprecated version
    Latest {
        /// Artifact name
        artifact: String,
    },
    /// Version currently holding a stage
    Which {
        /// Artifact name
        artifact: String,
        /// Stage label
        stage: String,
        /// Print every version holding the stage
        #[arg(long)]
        all: bool,
    },
    /// Latest index metadata of an artifact
    Describe {
        /// Artifact name
        artifact: String,
    },
    /// Classify a ref name against the registry
    CheckRef {
        /// Tag name or full ref
        reference: String,
    },
}

/// Parse arguments, run the requested command and map errors onto exit
/// codes: 0 success, 1 user error, 2 internal error, 130 cancellation.
pub fn run() -> ExitResult {
    let args = Cli::parse();

    let mut builder = get_logging(args.logging.log_level_filter());
    builder.init();

    if args.plain {
        colored::control::set_override(false);
    }

    let token = Token::new();
    let registry = Registry::open(&args.repo)?;
    let emojis = registry.config().emojis && !args.plain;

    match args.command {
        Command::Register {
            artifact,
            version,
            reference,
            bump,
            force,
        } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let commit = registry.resolve_commit(reference.as_deref())?;
            let plan = Mutator::new(&state, registry.config()).register(
                &artifact,
                &commit,
                version.as_deref(),
                bump,
                force,
            )?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Deregister {
            artifact,
            version,
            delete,
        } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let plan =
                Mutator::new(&state, registry.config()).deregister(&artifact, &version, delete)?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Assign {
            artifact,
            stage,
            version,
            reference,
            bump,
        } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let commit = match reference.as_deref() {
                Some(spec) => Some(registry.resolve_commit(Some(spec))?),
                None if version.is_none() => Some(registry.resolve_commit(None)?),
                None => None,
            };
            let plan = Mutator::new(&state, registry.config()).assign(
                &artifact,
                &stage,
                version.as_deref(),
                commit.as_deref(),
                bump,
            )?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Unassign {
            artifact,
            stage,
            version,
            delete,
        } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let plan = Mutator::new(&state, registry.config()).unassign(
                &artifact,
                &stage,
                version.as_deref(),
                delete,
            )?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Deprecate { artifact, delete } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let commit = registry.resolve_commit(None)?;
            let plan =
                Mutator::new(&state, registry.config()).deprecate(&artifact, &commit, delete)?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Annotate { artifact, message } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let commit = registry.resolve_commit(None)?;
            let plan =
                Mutator::new(&state, registry.config()).annotate(&artifact, &commit, &message)?;
            execute_plan(&registry, &plan, &token)?;
        }
        Command::Show {
            artifact,
            all,
            all_branches,
            all_commits,
        } => {
            let scope = scope_from_flags(all_branches, all_commits);
            let state = registry.assemble(&scope, &token)?;
            match artifact {
                Some(artifact) => render_versions(&state, &artifact, all, emojis)?,
                None => render_show(&state, emojis),
            }
        }
        Command::History {
            artifact,
            all_branches,
            all_commits,
        } => {
            let scope = scope_from_flags(all_branches, all_commits);
            let state = registry.assemble(&scope, &token)?;
            let rows = query::history(&state, artifact.as_deref())?;
            render_history(&rows, emojis);
        }
        Command::Latest { artifact } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            match query::latest(&state, &artifact)? {
                Some(version) => println!("{}", version.version),
                None => {
                    return Err(Exit::new(Code::FAILURE)
                        .with_message(format!("artifact {artifact} has no registered versions")))
                }
            }
        }
        Command::Which {
            artifact,
            stage,
            all,
        } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            let versions = query::which_all(&state, &artifact, &stage)?;
            if all {
                for version in versions {
                    println!("{version}");
                }
            } else if let Some(version) = versions.first() {
                println!("{version}");
            }
        }
        Command::Describe { artifact } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            // Uncommitted annotations are still describable: fall back to
            // the working tree index when the assembled state has nothing.
            let committed = match query::describe(&state, &artifact) {
                Ok(meta) => meta.cloned(),
                Err(Error::UnknownArtifact(_)) => None,
                Err(e) => return Err(e.into()),
            };
            let meta = match committed {
                Some(meta) => Some(meta),
                None => {
                    let index =
                        crate::index::read_worktree(registry.repo(), &registry.config().index)?;
                    index.get(&artifact).cloned()
                }
            };
            match meta {
                Some(meta) => {
                    let yaml = serde_yaml::to_string(&meta)
                        .map_err(|e| Error::Config(format!("cannot render metadata: {e}")))?;
                    print!("{yaml}");
                }
                None => {
                    return Err(Exit::new(Code::FAILURE)
                        .with_message(format!("unknown artifact {artifact}")))
                }
            }
        }
        Command::CheckRef { reference } => {
            let state = registry.assemble(&Scope::Head, &token)?;
            match query::check_ref(&state, &reference) {
                Some(event) => render_check_ref(&event),
                None => {
                    return Err(Exit::new(Code::FAILURE)
                        .with_message(format!("{reference} is not a registry ref")))
                }
            }
        }
    }

    Code::SUCCESS.ok()
}

fn get_logging(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();

    builder.filter(None, level);

    builder.format_timestamp_secs().format_module_path(false);

    builder
}

fn scope_from_flags(all_branches: bool, all_commits: bool) -> Scope {
    if all_commits {
        Scope::AllCommits
    } else if all_branches {
        Scope::AllBranches
    } else {
        Scope::Head
    }
}

fn execute_plan(registry: &Registry, plan: &Plan, token: &Token) -> Result<(), Error> {
    if plan.is_noop() {
        println!("Nothing to do");
        return Ok(());
    }
    let names = registry.apply(plan, token)?;
    let verb = match plan {
        Plan::Write(_) => "Created",
        Plan::Delete(_) => "Deleted",
    };
    for name in names {
        println!("{verb} tag {name}");
    }
    Ok(())
}

fn render_show(state: &RegistryState, emojis: bool) {
    let rows = query::show(state);
    if rows.is_empty() {
        println!("The registry is empty");
        return;
    }

    let mut stages: Vec<String> = Vec::new();
    for row in &rows {
        for stage in row.stages.keys() {
            if !stages.contains(stage) {
                stages.push(stage.clone());
            }
        }
    }
    stages.sort();

    let mut header = vec!["name".to_string(), "latest".to_string()];
    header.extend(stages.iter().map(|s| format!("#{s}")));

    let mut table: Vec<Vec<String>> = vec![header];
    for row in &rows {
        let name = if row.deprecated {
            decorate_deprecated(&row.artifact, emojis)
        } else {
            row.artifact.clone()
        };
        let mut cells = vec![name, row.latest.clone().unwrap_or_else(|| "-".to_string())];
        for stage in &stages {
            let cell = row
                .stages
                .get(stage)
                .map(|versions| versions.join(", "))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "-".to_string());
            cells.push(cell);
        }
        table.push(cells);
    }
    print_table(&table);
}

fn render_versions(
    state: &RegistryState,
    artifact: &str,
    all: bool,
    emojis: bool,
) -> Result<(), Error> {
    let rows = query::show_versions(state, artifact, all)?;
    if rows.is_empty() {
        println!("No versions registered for {artifact}");
        return Ok(());
    }
    let mut table = vec![vec![
        "version".to_string(),
        "commit".to_string(),
        "created_at".to_string(),
        "stages".to_string(),
    ]];
    for row in rows {
        let version = if row.deprecated {
            decorate_deprecated(&row.version, emojis)
        } else {
            row.version
        };
        let stages: Vec<String> = row.stages.iter().cloned().collect();
        table.push(vec![
            version,
            short_sha(&row.commit),
            format_time(row.created_at),
            if stages.is_empty() {
                "-".to_string()
            } else {
                stages.join(", ")
            },
        ]);
    }
    print_table(&table);
    Ok(())
}

fn render_history(rows: &[HistoryRow], emojis: bool) {
    for row in rows {
        let event = &row.event;
        let detail = match event.kind {
            EventKind::Registration | EventKind::Deregistration => {
                event.version.clone().unwrap_or_default()
            }
            EventKind::Assignment | EventKind::Unassignment => {
                format!("#{}", event.stage.clone().unwrap_or_default())
            }
            EventKind::Commit => short_sha(&event.commit),
            EventKind::Deprecation | EventKind::Annotation => String::new(),
        };
        let marker = match row.marker {
            Some(Marker::Conflict) => " [conflict]".red().to_string(),
            Some(Marker::Orphan) => " [orphan]".yellow().to_string(),
            None => String::new(),
        };
        println!(
            "{}  {:<12} {} {} ({}){}",
            format_time(event.timestamp),
            kind_label(event.kind, emojis),
            event.artifact.bold(),
            detail,
            event.reference,
            marker,
        );
    }
}

fn render_check_ref(event: &Event) {
    let mut parts = vec![event.kind.to_string(), event.artifact.clone()];
    if let Some(version) = &event.version {
        parts.push(version.clone());
    }
    if let Some(stage) = &event.stage {
        parts.push(format!("#{stage}"));
    }
    println!("{}", parts.join(" "));
    println!("commit {}", event.commit);
    if let Some(message) = &event.message {
        println!("message {message}");
    }
}

fn kind_label(kind: EventKind, emojis: bool) -> String {
    if !emojis {
        return kind.to_string();
    }
    let glyph = match kind {
        EventKind::Commit => "📝",
        EventKind::Registration => "🏷",
        EventKind::Deregistration => "✖",
        EventKind::Assignment => "🚦",
        EventKind::Unassignment => "⏸",
        EventKind::Deprecation => "🗑",
        EventKind::Annotation => "💬",
    };
    format!("{glyph} {kind}")
}

fn decorate_deprecated(name: &str, emojis: bool) -> String {
    if emojis {
        format!("🗑 {name}")
    } else {
        format!("{name} (deprecated)")
    }
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

fn format_time(timestamp: i64) -> String {
    match chrono::DateTime::from_timestamp(timestamp, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

fn print_table(table: &[Vec<String>]) {
    let columns = table.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in table {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    for (index, row) in table.iter().enumerate() {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            let padded = format!("{cell:<width$}", width = widths[i]);
            if index == 0 {
                line.push_str(&padded.bold().to_string());
            } else {
                line.push_str(&padded);
            }
            if i + 1 < row.len() {
                line.push_str("  ");
            }
        }
        println!("{}", line.trim_end());
    }
}
