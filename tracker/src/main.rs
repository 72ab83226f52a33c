use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracker::api::{AppState, router, run};
use tracker::auth::{Auth, NewUser};
use tracker::config::{Config, redact_db_url};
use tracker::entity::Role;
use tracker::photos::host_from_config;
use tracker::seed::{SeedOutcome, seed_demo};

#[derive(Parser)]
#[command(name = "tracker", about = "Tender Tracker: tenders, milestones and field progress reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Load demo users, events, milestones and reports into an empty store
    Seed,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// admin, supervisor or petugas
        #[arg(long, default_value = "petugas")]
        role: String,
        #[arg(long)]
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env();

    tracing::info!(database = %redact_db_url(&config.database_url), "connecting to database");

    let db = Database::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;

    tracing::info!("database initialized");

    let auth = Arc::new(Auth::new(db.clone()));

    match cli.command {
        None | Some(Commands::Serve) => serve(config, auth, db).await?,
        Some(Commands::User { action }) => handle_user_action(&auth, action).await?,
        Some(Commands::Seed) => match seed_demo(&db).await? {
            SeedOutcome::Seeded => println!("Demo data loaded."),
            SeedOutcome::Skipped => println!("Users already exist; nothing seeded."),
        },
    }

    Ok(())
}

async fn serve(
    config: Config,
    auth: Arc<Auth>,
    db: sea_orm::DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Auto-seed an admin if no users exist
    if auth.count_users().await? == 0 {
        let Some(admin_pass) = config.admin_password.clone() else {
            eprintln!(
                "FATAL: TT_ADMIN_PASSWORD is not set. \
                 Set this environment variable to a strong password before starting."
            );
            std::process::exit(1);
        };

        tracing::warn!(username = %config.admin_user, "No users found, seeding default admin.");
        auth.create_user(NewUser {
            username: config.admin_user.clone(),
            email: config.admin_email.clone(),
            password: admin_pass,
            role: Role::Admin,
            display_name: "Administrator".to_string(),
            profile_photo: None,
        })
        .await?;
    }

    let photos = host_from_config(&config.imagekit)?;

    let state = AppState {
        auth,
        db: db.clone(),
        jwt_secret: config.jwt_secret_or_random(),
        jwt_expiry_hours: config.jwt_expiry_hours,
        photos: Arc::from(photos),
        upload: config.upload.clone(),
    };

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "API online");

    run(
        listener,
        router(state, &config.cors_allowed_origins),
        db,
        shutdown_signal(),
    )
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn handle_user_action(
    auth: &Auth,
    action: UserAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        UserAction::Create {
            username,
            email,
            password,
            role,
            display_name,
        } => {
            let role = Role::parse(&role).ok_or_else(|| format!("unknown role '{role}'"))?;
            auth.create_user(NewUser {
                username: username.clone(),
                email,
                password,
                role,
                display_name,
                profile_photo: None,
            })
            .await?;
            tracing::info!(username = %username, role = role.as_str(), "Created user");
        }
    }
    Ok(())
}
