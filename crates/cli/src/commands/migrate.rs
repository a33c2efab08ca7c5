use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use miflo_core::AppConfig;
use miflo_orm::migrations::naming;
use miflo_orm::{
    connect, MigrationError, MigrationManager, MigrationRollback, MigrationRunner, MigrationStatus,
    StoreOptions,
};
use tokio_util::sync::CancellationToken;

use crate::interactive::Prompt;

/// Create a new migration unit under `<project_dir>/migrations`
pub async fn create(config: &AppConfig, name: &str, assume_yes: bool) -> Result<()> {
    // Nothing is written for a name that would be rejected anyway
    if !naming::is_valid_name(name) {
        return Err(MigrationError::InvalidName(name.to_string()).into());
    }

    let manager = MigrationManager::new(config.migrations_dir());

    if !manager.exists() {
        let create_dir = assume_yes
            || tokio::task::spawn_blocking(|| {
                Prompt::confirm(
                    "Migrations folder does not exist. Would you like to create it?",
                    false,
                )
            })
            .await?
            .context("Failed to read answer")?;

        if !create_dir {
            println!("{}", style("Aborted, no migration created").yellow());
            return Ok(());
        }
        manager.create_root()?;
    }

    let unit = manager
        .create_migration(name, Utc::now().timestamp())
        .context("Error creating migration")?;

    println!(
        "{} {}",
        style("Created migration").green().bold(),
        style(manager.root().join(&unit).display()).cyan()
    );
    Ok(())
}

/// Print the migrations that `up` would apply
pub async fn list(config: &AppConfig, json: bool) -> Result<()> {
    let runner = open_runner(config).await?;
    let pending = runner.pending_migrations().await;
    runner.close().await;
    let pending = pending?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending migrations");
        return Ok(());
    }

    println!("{}", style("Pending migrations:").bold());
    for unit in &pending {
        println!("  {}", style(unit).yellow());
    }
    Ok(())
}

/// Apply every pending migration as one batch
pub async fn up(config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    let runner = open_runner(config).await?;
    let result = runner.run_migrations(cancel).await;
    runner.close().await;
    let result = result.context("Migrations were not applied")?;

    let Some(batch) = result.batch else {
        println!("No pending migrations to apply");
        return Ok(());
    };

    for unit in &result.applied_migrations {
        println!("  {} {}", style("up").green(), unit);
    }
    println!(
        "{} {} migration(s) applied in batch {} ({} ms)",
        style("✓").green().bold(),
        result.applied_count,
        batch,
        result.execution_time_ms
    );
    Ok(())
}

/// Revert the most recent batch
pub async fn revert(config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    let runner = open_runner(config).await?;
    let result = runner.rollback_last_batch(cancel).await;
    runner.close().await;
    let result = result.context("Migrations were not reverted")?;

    let Some(batch) = result.batch else {
        println!("No migrations to revert");
        return Ok(());
    };

    for unit in &result.rolled_back_migrations {
        println!("  {} {}", style("down").yellow(), unit);
    }
    println!(
        "{} {} migration(s) reverted from batch {} ({} ms)",
        style("✓").green().bold(),
        result.rolled_back_count,
        batch,
        result.execution_time_ms
    );
    Ok(())
}

/// Show every known migration with its state
pub async fn status(config: &AppConfig, json: bool) -> Result<()> {
    let runner = open_runner(config).await?;
    let entries = runner.migration_status().await;
    runner.close().await;
    let entries = entries?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", style("Migration Status:").bold());
    if entries.is_empty() {
        println!("  No migrations found");
        return Ok(());
    }

    for entry in &entries {
        let missing = if entry.on_disk {
            String::new()
        } else {
            format!(" {}", style("(missing on disk)").red())
        };

        match &entry.status {
            MigrationStatus::Applied { applied_at, batch } => {
                let applied_at = applied_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} {}  batch {}  {}{}",
                    style("[x]").green(),
                    entry.name,
                    batch,
                    style(applied_at).dim(),
                    missing
                );
            }
            MigrationStatus::Pending => {
                println!("  {} {}  {}{}", style("[ ]").yellow(), entry.name, style("pending").dim(), missing);
            }
        }
    }
    Ok(())
}

async fn open_runner(config: &AppConfig) -> Result<MigrationRunner> {
    let database_url = config.require_database_url()?;
    let options = StoreOptions {
        migrations_table: config.migrations_table.clone(),
        auth_token: config.libsql_auth_token.clone(),
    };

    let store = connect(database_url, &options)
        .await
        .context("Error setting up database")?;

    Ok(MigrationRunner::new(
        store,
        MigrationManager::new(config.migrations_dir()),
    ))
}
