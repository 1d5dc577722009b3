use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use transparency_portal::acl::Acl;
use transparency_portal::authz::roles;
use transparency_portal::config::AppConfig;
use transparency_portal::jobs::NotificationCleanupJob;
use transparency_portal::utils::{hash_password, normalize_email};
use transparency_portal::{db, seed};

#[derive(Parser, Debug)]
#[command(author, version, about = "transparency-portal maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Seed the default roles and permissions
    SeedAcl,
    /// Create an active, verified administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = roles::SUPER_ADMIN)]
        role: String,
    },
    /// Delete notifications older than the retention window
    PurgeNotifications {
        /// Defaults to NOTIFICATION_RETENTION_DAYS
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The binary may run from a different CWD inside containers.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::SeedAcl => {
            let pool = db::init().await?;
            let report = seed::seed_acl(&pool).await?;
            println!(
                "Seeded {} permissions, {} roles, {} grants",
                report.permissions_created, report.roles_created, report.grants_created
            );
        }
        Commands::CreateAdmin {
            email,
            password,
            name,
            role,
        } => {
            let pool = db::init().await?;
            seed::seed_acl(&pool).await?;
            let uuid = create_admin(&pool, &email, &password, name.as_deref(), &role).await?;
            println!("Created admin {} ({uuid}) with role {role}", normalize_email(&email));
        }
        Commands::PurgeNotifications { days } => {
            let days = match days {
                Some(days) => days,
                None => AppConfig::from_env()?.notification_retention_days,
            };
            let pool = db::init().await?;
            let deleted = NotificationCleanupJob::new(pool, days).purge().await?;
            println!("Deleted {deleted} notifications older than {days} days");
        }
    }

    Ok(())
}

async fn create_admin(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: Option<&str>,
    role: &str,
) -> anyhow::Result<Uuid> {
    let role_id: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE slug = ?")
        .bind(role)
        .fetch_optional(pool)
        .await?;
    if role_id.is_none() {
        anyhow::bail!("unknown role: {role}");
    }

    let email = normalize_email(email);
    let password = hash_password(password)?;
    let uuid = Uuid::new_v4();
    let now = Utc::now();

    let user_id = sqlx::query(
        "INSERT INTO users (uuid, full_name, email, password, is_admin, is_active, email_verified_at, created_at, updated_at) VALUES (?, ?, ?, ?, 1, 1, ?, ?, ?)",
    )
    .bind(uuid.to_string())
    .bind(name.map(str::trim).filter(|n| !n.is_empty()))
    .bind(&email)
    .bind(password)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("failed to create user {email}"))?
    .last_insert_rowid();

    Acl::new(pool.clone()).assign_role(user_id, role).await?;
    Ok(uuid)
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
