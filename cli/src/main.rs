mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    WorkoutArgs, cmd_goals_set, cmd_goals_show, cmd_notify_list, cmd_notify_read,
    cmd_user_create, cmd_user_show, cmd_water_history, cmd_water_log, cmd_water_show,
    cmd_workout_delete, cmd_workout_list, cmd_workout_log, scope_for,
};
use crate::config::Config;
use stride_core::db::Database;
use stride_core::models::NewGoals;
use stride_core::storage::Storage;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "A local-first fitness tracker",
    long_about = "Track workouts, hydration, goals and notifications locally, \
                  or serve them over a small REST API."
)]
struct Cli {
    /// Database file (default: stride.db in the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
    /// Log, list and delete workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Track glasses of water per day
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Set and show fitness goals
    Goals {
        #[command(subcommand)]
        command: GoalsCommands,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// List and acknowledge notifications
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Record a workout
    Log {
        /// Workout type (e.g. "Running", "Strength")
        workout_type: String,
        /// Duration in minutes
        #[arg(short, long)]
        duration: i64,
        /// Calories burned
        #[arg(short, long, default_value = "0")]
        calories: i64,
        /// Intensity: low, moderate, high
        #[arg(short, long, default_value = "moderate")]
        intensity: String,
        /// Icon name shown by clients
        #[arg(long, default_value = "figure.walk")]
        icon: String,
        /// Average heart rate (bpm)
        #[arg(long)]
        heart_rate: Option<i64>,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent workouts
    List {
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout by ID
    Delete {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Set the number of glasses for a day (overwrites)
    Log {
        /// Glasses drunk so far
        glasses: i64,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one day's hydration
    Show {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recently logged days
    History {
        /// Number of logged days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalsCommands {
    /// Set goals; unspecified goals keep their current value
    Set {
        /// Daily step count
        #[arg(long)]
        steps: Option<i64>,
        /// Daily calorie target
        #[arg(long)]
        calories: Option<i64>,
        /// Workouts per week
        #[arg(long)]
        workouts: Option<i64>,
        /// Target weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Glasses of water per day
        #[arg(long)]
        water: Option<i64>,
        /// Hours of sleep per night
        #[arg(long)]
        sleep: Option<f64>,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current goals
    Show {
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Create {
        /// Unique username
        username: String,
        /// Display name
        #[arg(long)]
        display_name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user by id or username
    Show {
        /// User id or username
        user: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// List recent notifications
    List {
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a notification read (all of them when no ID is given)
    Read {
        /// Notification ID
        id: Option<i64>,
        /// User id (default: global scope)
        #[arg(short, long)]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stride=info,stride_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let open_db = || Database::open(&config.db_path);

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _) = config.load_or_create_api_key()?;
                Some(key)
            };
            let storage = Storage::open(&config.db_path).await?;
            server::start_server(storage, port, &bind, api_key).await
        }
        Commands::Workout { command } => run_workout(&open_db()?, command),
        Commands::Water { command } => run_water(&open_db()?, command),
        Commands::Goals { command } => run_goals(&open_db()?, command),
        Commands::User { command } => match command {
            UserCommands::Create {
                username,
                display_name,
                json,
            } => cmd_user_create(&open_db()?, &username, display_name, json),
            UserCommands::Show { user, json } => cmd_user_show(&open_db()?, &user, json),
        },
        Commands::Notify { command } => {
            let db = open_db()?;
            match command {
                NotifyCommands::List { user, json } => {
                    cmd_notify_list(&db, &scope_for(user.as_deref()), json)
                }
                NotifyCommands::Read { id, user, json } => {
                    cmd_notify_read(&db, &scope_for(user.as_deref()), id, json)
                }
            }
        }
    }
}

fn run_workout(db: &Database, command: WorkoutCommands) -> Result<()> {
    match command {
        WorkoutCommands::Log {
            workout_type,
            duration,
            calories,
            intensity,
            icon,
            heart_rate,
            date,
            user,
            json,
        } => cmd_workout_log(
            db,
            &scope_for(user.as_deref()),
            WorkoutArgs {
                workout_type,
                duration,
                calories,
                intensity,
                icon,
                heart_rate,
                date,
            },
            json,
        ),
        WorkoutCommands::List { user, json } => {
            cmd_workout_list(db, &scope_for(user.as_deref()), json)
        }
        WorkoutCommands::Delete { id, json } => cmd_workout_delete(db, id, json),
    }
}

fn run_water(db: &Database, command: WaterCommands) -> Result<()> {
    match command {
        WaterCommands::Log {
            glasses,
            date,
            user,
            json,
        } => cmd_water_log(db, &scope_for(user.as_deref()), glasses, date, json),
        WaterCommands::Show { date, user, json } => {
            cmd_water_show(db, &scope_for(user.as_deref()), date, json)
        }
        WaterCommands::History { days, user, json } => {
            cmd_water_history(db, &scope_for(user.as_deref()), days, json)
        }
    }
}

fn run_goals(db: &Database, command: GoalsCommands) -> Result<()> {
    match command {
        GoalsCommands::Set {
            steps,
            calories,
            workouts,
            weight,
            water,
            sleep,
            user,
            json,
        } => cmd_goals_set(
            db,
            &scope_for(user.as_deref()),
            NewGoals {
                user_id: None,
                daily_steps: steps,
                daily_calories: calories,
                weekly_workouts: workouts,
                target_weight_kg: weight,
                daily_water_glasses: water,
                sleep_hours: sleep,
            },
            json,
        ),
        GoalsCommands::Show { user, json } => cmd_goals_show(db, &scope_for(user.as_deref()), json),
    }
}
