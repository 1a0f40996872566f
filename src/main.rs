use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{Config, DATA_DIR_ENV_VAR},
    models::{filter::Filter, theme::Theme},
    services::tasks::{
        EditTaskParameters, RemoveTaskParameters, TaskCommandError, ToggleTaskParameters,
        edit_task, remove_task, toggle_task,
    },
    storage::{KeyValueStore, StorageError, json::JsonFileStorage},
    store::TaskListStore,
    ui::Palette,
};

mod config;
mod models;
mod services;
mod storage;
mod store;
mod ui;

#[derive(Parser)]
#[command(
    name = "todos",
    about = "A small to-do list that remembers your tasks between runs"
)]
struct Cli {
    /// Directory where tasks and preferences are stored
    #[arg(long, global = true, env = DATA_DIR_ENV_VAR)]
    data_dir: Option<PathBuf>,

    /// Print debug logs to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tasks, using the saved filter unless --filter is given
    #[command(alias = "ls")]
    List {
        /// Show only these tasks for this run: all, pending or completed
        #[arg(short, long)]
        filter: Option<Filter>,
    },

    /// Add a new task
    Add {
        /// Task text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Mark a task as done, or as pending again
    #[command(alias = "done")]
    Toggle {
        /// Position shown by `list`, id prefix, or part of the text
        task: String,
    },

    /// Delete a task
    #[command(alias = "rm")]
    Remove {
        /// Position shown by `list`, id prefix, or part of the text
        task: String,
    },

    /// Change the text of a task
    Edit {
        /// Position shown by `list`, id prefix, or part of the text
        task: String,

        /// New task text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Choose which tasks `list` shows: all, pending or completed
    Filter { filter: Filter },

    /// Delete all completed tasks
    ClearCompleted,

    /// Delete every task
    ClearAll {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show task counts
    Stats,

    /// Switch between the light and dark theme
    Theme,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Task(#[from] TaskCommandError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read confirmation: {0}")]
    Prompt(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    install_tracing(cli.verbose);

    let config = Config::resolve(cli.data_dir.as_deref());
    let storage = JsonFileStorage::new(config.data_dir);
    let mut store = TaskListStore::hydrate(storage);
    let palette = Palette::for_theme(store.theme());

    let command = cli.command.unwrap_or(Commands::List { filter: None });
    match run(&mut store, command, &palette) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::render_error(&e.to_string(), &palette);
            ExitCode::FAILURE
        }
    }
}

fn install_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

fn run(
    store: &mut TaskListStore<impl KeyValueStore>,
    command: Commands,
    palette: &Palette,
) -> Result<(), CliError> {
    match command {
        Commands::List { filter } => {
            ui::render_header(palette);
            let view = match filter {
                Some(filter) => store.derived_view_with(filter),
                None => store.derived_view(),
            };
            ui::render_view(&view, store.tasks(), palette);
        }
        Commands::Add { text } => match store.add(&text.join(" "))? {
            Some(task) => ui::render_notice(&format!("Added \"{}\"", task.text), palette),
            None => ui::render_noop("Nothing added: task text is empty"),
        },
        Commands::Toggle { task } => {
            let task = toggle_task(store, ToggleTaskParameters { reference: task })?;
            let state = if task.completed { "done" } else { "pending" };
            ui::render_notice(&format!("Marked \"{}\" as {}", task.text, state), palette);
        }
        Commands::Remove { task } => {
            let task = remove_task(store, RemoveTaskParameters { reference: task })?;
            ui::render_notice(&format!("Deleted \"{}\"", task.text), palette);
        }
        Commands::Edit { task, text } => {
            let parameters = EditTaskParameters {
                reference: task,
                text: text.join(" "),
            };
            match edit_task(store, parameters)? {
                Some(task) => ui::render_notice(&format!("Updated to \"{}\"", task.text), palette),
                None => ui::render_noop("Task left unchanged: new text is empty"),
            }
        }
        Commands::Filter { filter } => {
            store.set_filter(filter)?;
            ui::render_header(palette);
            ui::render_view(&store.derived_view(), store.tasks(), palette);
        }
        Commands::ClearCompleted => match store.clear_completed()? {
            0 => ui::render_noop("No completed tasks to clear"),
            removed => ui::render_notice(
                &format!("Cleared {} completed {}", removed, tasks_word(removed)),
                palette,
            ),
        },
        Commands::ClearAll { yes } => {
            if store.tasks().is_empty() {
                ui::render_noop("No tasks to clear");
                return Ok(());
            }

            let confirmed = yes
                || confirm(
                    "Are you sure you want to delete all tasks? This action cannot be undone.",
                )?;
            if !confirmed {
                ui::render_noop("Aborted");
                return Ok(());
            }

            let removed = store.clear_all()?;
            ui::render_notice(
                &format!("Deleted {} {}", removed, tasks_word(removed)),
                palette,
            );
        }
        Commands::Stats => {
            println!("  {}", ui::format_stats(&store.derived_view().counts));
        }
        Commands::Theme => {
            let theme = store.toggle_theme()?;
            let name = match theme {
                Theme::Light => "light",
                Theme::Dark => "dark",
            };
            ui::render_notice(
                &format!("Switched to the {} theme", name),
                &Palette::for_theme(theme),
            );
        }
    }

    Ok(())
}

fn tasks_word(count: usize) -> &'static str {
    if count == 1 { "task" } else { "tasks" }
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("  {} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
