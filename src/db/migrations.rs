use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order. Entry `i` upgrades `user_version` `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

fn latest_version() -> i32 {
    MIGRATIONS.len() as i32
}

fn user_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Bring the schema up to date in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found = user_version(conn)?;
    let latest = latest_version();

    if found > latest {
        bail!("database schema v{found} is newer than this build understands (v{latest})");
    }
    if found == latest {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to begin migration transaction")?;

    for (name, script) in &MIGRATIONS[found as usize..] {
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply {name}"))?;
    }

    tx.pragma_update(None, "user_version", latest)
        .context("failed to bump user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    log::info!("Migrated database schema from v{found} to v{latest}");
    Ok(())
}
