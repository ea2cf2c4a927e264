//! Creates the A/B testing tables. Exits with status 1 on the first failure.

use std::process::ExitCode;

use beta_admin_api::config::DatabaseConfig;
use sqlx::{Connection, Executor, PgConnection};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MIGRATION: &str = include_str!("../../migrations/ab_testing.sql");

/// Drops `--` comment lines and splits on `;`.
fn statements(sql: &str) -> Vec<String> {
    let cleaned = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn table_name(statement: &str) -> Option<&str> {
    let rest = statement.split("CREATE TABLE IF NOT EXISTS").nth(1)?;
    rest.split(|c: char| c.is_whitespace() || c == '(')
        .find(|s| !s.is_empty())
}

async fn run(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    let statements = statements(MIGRATION);
    tracing::info!("Found {} SQL statements to execute", statements.len());

    for (i, statement) in statements.iter().enumerate() {
        match table_name(statement) {
            Some(table) => tracing::info!("Creating table: {}", table),
            None => tracing::info!("Executing statement {}", i + 1),
        }
        (&mut *conn).execute(statement.as_str()).await?;
    }

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::TEXT FROM pg_tables WHERE schemaname = current_schema() AND tablename LIKE 'ab\\_%' ORDER BY tablename",
    )
    .fetch_all(&mut *conn)
    .await?;
    tracing::info!("Migration completed, tables present: {}", tables.join(", "));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database = match DatabaseConfig::from_env() {
        Ok(database) => database,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Connecting to {}:{}/{}",
        database.host, database.port, database.database
    );
    let mut conn = match PgConnection::connect_with(&database.connect_options()).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Migration failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&mut conn).await;

    if let Err(e) = conn.close().await {
        tracing::warn!("Failed to close database connection: {}", e);
    } else {
        tracing::info!("Database connection closed");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Migration failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bundled_migration() {
        let statements = statements(MIGRATION);
        assert_eq!(statements.len(), 4);
        assert_eq!(table_name(&statements[0]), Some("ab_tests"));
        assert_eq!(table_name(&statements[1]), Some("ab_test_participants"));
        assert_eq!(table_name(&statements[2]), None);
        assert!(statements.iter().all(|s| !s.contains("--")));
    }
}
