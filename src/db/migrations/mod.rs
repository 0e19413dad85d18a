use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Migrations in the order they are applied. Every script is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_cameras.sql",
        include_str!("sql/001_create_cameras.sql"),
    ),
    (
        "002_create_events.sql",
        include_str!("sql/002_create_events.sql"),
    ),
    ("003_add_indexes.sql", include_str!("sql/003_add_indexes.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in ordered(MIGRATIONS) {
        pool.execute(sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

/// Sort by numeric file prefix; unnumbered scripts run last
fn ordered<'a>(migrations: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut entries = migrations.to_vec();

    fn get_order_value(name: &str) -> usize {
        name.split('_')
            .next()
            .and_then(|prefix| prefix.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    }

    entries.sort_by_key(|(name, _)| get_order_value(name));
    entries
}
