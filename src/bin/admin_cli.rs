use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use strum::IntoEnumIterator;

use commerce_admin_api::{
    auth::permissions::ADMIN_ROLE,
    config, db,
    jobs::{self, JobContext, JobKind},
    notifications::{LogMailer, Mailer},
    repositories::user_repository::CreateUser,
    AppState,
};

#[derive(Parser)]
#[command(
    name = "commerce-admin-cli",
    about = "Maintenance commands for the commerce admin API",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create the built-in permissions and roles
    Seed,
    /// Create a staff user holding the admin role
    CreateAdmin(CreateAdminArgs),
    /// Run one background job immediately
    RunJob(RunJobArgs),
    /// List the background jobs known to `run-job`
    Jobs,
}

#[derive(Args)]
struct CreateAdminArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct RunJobArgs {
    /// Job name, e.g. `escalate-delayed-orders`
    name: String,
}

#[derive(Serialize)]
struct JobOutcome {
    job: String,
    affected: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Jobs = cli.command {
        let names: Vec<String> = JobKind::iter().map(|kind| kind.to_string()).collect();
        if cli.json {
            print_json(&names)?;
        } else {
            names.iter().for_each(|name| println!("{}", name));
        }
        return Ok(());
    }

    let state = initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&state.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Seed => {
            let summary = state.repos.roles.seed_defaults().await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!(
                    "Seeded {} permission(s) and {} role(s)",
                    summary.permissions_created, summary.roles_created
                );
            }
        }
        Commands::CreateAdmin(args) => {
            state.repos.roles.seed_defaults().await?;
            let admin_role = state.repos.roles.find_by_name(ADMIN_ROLE).await?;
            let created = state
                .repos
                .users
                .create(CreateUser {
                    name: args.name,
                    email: args.email,
                    password: args.password,
                    is_active: Some(true),
                    role_ids: vec![admin_role.id],
                })
                .await
                .context("failed to create admin user")?;
            if cli.json {
                print_json(&created)?;
            } else {
                println!("Created admin {} <{}>", created.user.id, created.user.email);
            }
        }
        Commands::RunJob(args) => {
            let kind = JobKind::parse(&args.name)?;
            let ctx = JobContext::from_state(&state);
            let affected = jobs::run_job(&ctx, kind, Utc::now()).await?;
            let outcome = JobOutcome {
                job: kind.to_string(),
                affected,
            };
            if cli.json {
                print_json(&outcome)?;
            } else {
                println!("{}: {} record(s) affected", outcome.job, outcome.affected);
            }
        }
        Commands::Jobs => {}
    }

    Ok(())
}

async fn initialize() -> Result<AppState> {
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    let db_pool = db::connect_from_app_config(&config)
        .await
        .context("failed to connect to database")?;

    let (event_sender, event_rx) =
        commerce_admin_api::events::channel(config.event_channel_capacity);
    tokio::spawn(commerce_admin_api::events::process_events(event_rx));

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
    Ok(AppState::new(
        Arc::new(db_pool),
        config,
        event_sender,
        mailer,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
