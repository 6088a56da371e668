use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use taskbuddy::{Category, CategoryFilter, Config, Persistence, StatusFilter, Task, TaskId, TaskStore, export_snapshot};
use tracing::Level;

#[derive(Parser)]
#[command(name = "taskbuddy")]
#[command(about = "TaskBuddy - organize your life, one task at a time")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Directory holding the task database (default: from config, then the user data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Path to a config file (default: <config dir>/taskbuddy/config.yml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task text
        #[arg(required = true)]
        text: Vec<String>,

        /// Category (Personal, Work, Health, Shopping, Learning)
        #[arg(short, long)]
        category: Option<Category>,
    },

    /// Mark a task done, or not done again
    Toggle { id: TaskId },

    /// Delete a task
    Delete { id: TaskId },

    /// Delete every task and the saved snapshot
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List tasks
    List {
        /// Category to show, or "all"
        #[arg(short, long, default_value = "all")]
        category: CategoryFilter,

        /// all, active or completed
        #[arg(short, long, default_value = "all")]
        status: StatusFilter,

        /// Only tasks whose text contains this
        #[arg(short = 'q', long)]
        search: Option<String>,
    },

    /// Show completion statistics
    Stats,

    /// Show task counts per category
    Categories,

    /// Write a JSON backup of all tasks
    Export {
        /// Output directory (default: from config, then the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let level = match cli.verbose {
        0 => config.log_level()?.unwrap_or(Level::WARN),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let store_path = config.resolve_store_path(cli.store_path)?;
    let mut store = TaskStore::open(&store_path)
        .with_context(|| format!("Failed to open task store at {}", store_path.display()))?;
    store.set_active_category(config.default_category);

    match cli.command {
        Commands::Add { text, category } => {
            let text = text.join(" ");
            match store.add_task(&text, category) {
                Some(id) => {
                    if let Some(task) = store.get(id) {
                        println!("{} {}", "Added".green(), render_task(task));
                    }
                }
                None => println!("{}", "Nothing to add: task text is empty".yellow()),
            }
        }
        Commands::Toggle { id } => {
            if store.toggle_task(id) {
                if let Some(task) = store.get(id) {
                    println!("{}", render_task(task));
                }
            } else {
                println!("{}", format!("No task with id {}", id).yellow());
            }
        }
        Commands::Delete { id } => {
            if store.delete_task(id) {
                println!("{} task {}", "Deleted".red(), id);
            } else {
                println!("{}", format!("No task with id {}", id).yellow());
            }
        }
        Commands::Clear { yes } => {
            let count = store.tasks().len();
            if !yes && !confirm(&format!("Delete all {} tasks? This cannot be undone.", count))? {
                println!("Aborted");
                return Ok(());
            }
            store.clear_all()?;
            println!("{} {} tasks", "Cleared".red(), count);
        }
        Commands::List {
            category,
            status,
            search,
        } => {
            store.set_filter_category(category);
            store.set_status_filter(status);
            store.set_search(search.as_deref());
            print_list(&store);
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("{:<12}{}", "Total", stats.total.to_string().blue().bold());
            println!("{:<12}{}", "Completed", stats.completed.to_string().green().bold());
            println!("{:<12}{}", "Remaining", stats.remaining.to_string().yellow().bold());
            println!("{:<12}{}%", "Progress", stats.completion_percent);
            if let Some(saved) = store.last_saved_at() {
                println!("{:<12}{}", "Last saved", saved.dimmed());
            }
        }
        Commands::Categories => {
            let counts = store.category_counts();
            let non_empty: Vec<_> = counts.iter().filter(|(_, n)| **n > 0).collect();
            if non_empty.is_empty() {
                println!("No tasks yet");
            }
            for (category, count) in non_empty {
                println!("{:<12}{}", category.to_string(), count);
            }
        }
        Commands::Export { out } => {
            let dir = config.resolve_export_dir(out)?;
            let export = export_snapshot(store.tasks(), Local::now().date_naive())?;
            let path = export.write_to(&dir)?;
            println!("Exported {} tasks to {}", store.tasks().len(), path.display());
        }
    }

    Ok(())
}

fn print_list<P: Persistence>(store: &TaskStore<P>) {
    let tasks = store.filtered_tasks();
    if tasks.clone().next().is_none() {
        if store.tasks().is_empty() {
            println!("No tasks yet. Add one with `taskbuddy add <text>`.");
        } else {
            println!("No tasks match {}", store.filter());
        }
        return;
    }

    for task in tasks {
        println!("{}", render_task(task));
    }
}

fn render_task(task: &Task) -> String {
    let check = if task.completed { "[x]".green() } else { "[ ]".normal() };
    let text = if task.completed {
        task.text.strikethrough().dimmed()
    } else {
        task.text.normal()
    };
    let created = task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");

    format!(
        "{} {} {} {} {}",
        check,
        task.id.to_string().dimmed(),
        text,
        format!("({})", task.category).cyan(),
        created.to_string().dimmed()
    )
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
