use clap::{Parser, Subcommand};
use mission_engine::{
    models::{Cadence, NewTask, Priority, TaskFilter, TaskRecord, TaskStatus, UserProfile},
    scoring::{Clock, FixedClock, SystemClock},
    store::{InMemoryStore, SqliteStore},
    config::Settings,
    CompletionReceipt, MissionService,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "mission-engine")]
#[clap(about = "Track recurring missions, points, levels and streaks", long_about = None)]
struct Cli {
    /// Settings file layered over the defaults
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user account
    Register {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        name: String,

        #[clap(short, long)]
        email: String,
    },

    /// Add a mission
    Add {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        title: String,

        /// daily, weekly or monthly
        #[clap(short, long, default_value = "daily")]
        cadence: String,

        #[clap(short, long)]
        description: Option<String>,

        /// low, medium or high
        #[clap(short, long)]
        priority: Option<String>,

        /// Days until the mission is due (defaults to the cadence length)
        #[clap(long)]
        due_in_days: Option<i64>,
    },

    /// List missions
    List {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        cadence: Option<String>,

        #[clap(short, long)]
        status: Option<String>,
    },

    /// Complete a mission and collect its points
    Complete {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        task_id: String,
    },

    /// Archive a mission
    Archive {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        task_id: String,
    },

    /// Delete a mission
    Delete {
        #[clap(short, long)]
        user_id: String,

        #[clap(short, long)]
        task_id: String,
    },

    /// Show level, points and streak
    Profile {
        #[clap(short, long)]
        user_id: String,
    },

    /// Mark overdue missions as unfinished
    Sweep,

    /// Replay completions on the given day offsets against a scratch profile
    Simulate {
        /// Comma-separated day offsets, e.g. 0,1,2,5
        #[clap(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        days: Vec<i64>,

        #[clap(short, long, default_value = "daily")]
        cadence: String,
    },
}

fn parse_cadence(raw: &str) -> anyhow::Result<Cadence> {
    Cadence::from_str(raw).ok_or_else(|| anyhow::anyhow!("Invalid cadence: {}", raw))
}

fn default_due_days(cadence: Cadence) -> i64 {
    match cadence {
        Cadence::Daily | Cadence::Unknown => 1,
        Cadence::Weekly => 7,
        Cadence::Monthly => 30,
    }
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_task(task: &TaskRecord) {
    println!(
        "{}  [{}] {:<8} {:<10} {}  (due {})",
        task.id,
        task.priority.as_str(),
        task.cadence.as_str(),
        task.status.as_str(),
        task.title,
        task.end_date.format("%Y-%m-%d")
    );
}

fn print_profile(profile: &UserProfile, service_levels: &mission_engine::scoring::LevelCurve) {
    let progress = service_levels.progress(profile.total_points);
    println!("\n=== {} ===", profile.name);
    println!("Level: {}", profile.level);
    println!("Total points: {}", profile.total_points);
    println!("XP: {}", profile.xp);
    println!(
        "Progress: {}/{} ({} to level {})",
        progress.points_into_level,
        progress.points_per_level,
        progress.points_to_next_level,
        profile.level + 1
    );
    println!("Streak: {} day(s)", profile.streak);
}

fn print_receipt(receipt: &CompletionReceipt) {
    println!("\nMission complete: {}", receipt.task.title);
    println!("Points awarded: +{}", receipt.points_awarded);
    println!("Total points: {}", receipt.user.total_points);
    println!("Level: {}{}", receipt.user.level, if receipt.leveled_up { " (level up!)" } else { "" });
    println!("Streak: {} ({})", receipt.user.streak, receipt.transition.as_str());
}

async fn run_simulation(settings: &Settings, days: Vec<i64>, cadence: Cadence, json: bool) -> anyhow::Result<()> {
    let start = Utc::now();
    let clock = Arc::new(FixedClock::new(start));
    let service = MissionService::new(Arc::new(InMemoryStore::new()), settings.engine(), clock.clone());
    service.register_user("sim", "Simulation", "sim@localhost").await?;

    let mut receipts = Vec::new();
    for offset in days {
        clock.set(start + Duration::days(offset));
        let task = service
            .create_task(
                "sim",
                NewTask {
                    title: format!("day {}", offset),
                    description: None,
                    cadence,
                    priority: None,
                    start_date: None,
                    end_date: clock.now() + Duration::days(default_due_days(cadence)),
                },
            )
            .await?;
        receipts.push((offset, service.complete_task("sim", &task.id).await?));
    }

    emit(json, &receipts, |receipts| {
        println!("{:>5} {:>7} {:>7} {:>6} {:>6}  transition", "day", "awarded", "total", "level", "streak");
        for (offset, receipt) in receipts {
            println!(
                "{:>5} {:>7} {:>7} {:>6} {:>6}  {}",
                offset,
                receipt.points_awarded,
                receipt.user.total_points,
                receipt.user.level,
                receipt.user.streak,
                receipt.transition.as_str()
            );
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let (settings, load_error) = match &cli.config {
        Some(path) => (Settings::from_file(path)?, None),
        None => Settings::new_or_default(),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.app.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(e) = load_error {
        warn!("Could not load settings ({}), using defaults", e);
    }

    // Validate settings
    if let Err(e) = settings.validate() {
        error!("Invalid settings: {}", e);
        return Err(anyhow::anyhow!(e));
    }

    let json = cli.json;
    let command = match cli.command {
        Commands::Simulate { days, cadence } => {
            return run_simulation(&settings, days, parse_cadence(&cadence)?, json).await;
        }
        other => other,
    };

    let store = Arc::new(SqliteStore::connect(&settings.database).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = MissionService::new(store, settings.engine(), clock.clone());

    match command {
        Commands::Register { user_id, name, email } => {
            let profile = service.register_user(&user_id, &name, &email).await?;
            emit(json, &profile, |p| println!("Registered {} ({})", p.name, p.id))?;
        }

        Commands::Add { user_id, title, cadence, description, priority, due_in_days } => {
            let cadence = parse_cadence(&cadence)?;
            let priority = match priority {
                Some(raw) => Some(
                    Priority::from_str(&raw).ok_or_else(|| anyhow::anyhow!("Invalid priority: {}", raw))?,
                ),
                None => None,
            };
            let due = due_in_days.unwrap_or_else(|| default_due_days(cadence));

            let task = service
                .create_task(
                    &user_id,
                    NewTask {
                        title,
                        description,
                        cadence,
                        priority,
                        start_date: None,
                        end_date: clock.now() + Duration::days(due),
                    },
                )
                .await?;
            emit(json, &task, print_task)?;
        }

        Commands::List { user_id, cadence, status } => {
            let filter = TaskFilter {
                cadence: cadence.as_deref().map(parse_cadence).transpose()?,
                status: match status {
                    Some(raw) => Some(
                        TaskStatus::from_str(&raw).ok_or_else(|| anyhow::anyhow!("Invalid status: {}", raw))?,
                    ),
                    None => None,
                },
            };
            let tasks = service.list_tasks(&user_id, &filter).await?;
            emit(json, &tasks, |tasks| {
                if tasks.is_empty() {
                    println!("No missions found");
                }
                tasks.iter().for_each(print_task);
            })?;
        }

        Commands::Complete { user_id, task_id } => {
            let receipt = service.complete_task(&user_id, &task_id).await?;
            emit(json, &receipt, print_receipt)?;
        }

        Commands::Archive { user_id, task_id } => {
            let task = service.archive_task(&user_id, &task_id).await?;
            emit(json, &task, print_task)?;
        }

        Commands::Delete { user_id, task_id } => {
            service.delete_task(&user_id, &task_id).await?;
            println!("Mission {} removed", task_id);
        }

        Commands::Profile { user_id } => {
            let profile = service.profile(&user_id).await?;
            let levels = *service.engine().levels();
            emit(json, &profile, |p| print_profile(p, &levels))?;
        }

        Commands::Sweep => {
            let changed = service.sweep_overdue().await?;
            info!("Sweep finished");
            println!("Updated {} missions to 'unfinished'", changed);
        }

        Commands::Simulate { .. } => {
            return Err(anyhow::anyhow!("simulate does not use the database"));
        }
    }

    Ok(())
}
