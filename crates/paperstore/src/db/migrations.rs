//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_papers_table",
        sql: include_str!("sql/001_create_papers.sql"),
    },
    Migration {
        version: 2,
        description: "create_notes_and_tags_tables",
        sql: include_str!("sql/002_create_notes_and_tags.sql"),
    },
    Migration {
        version: 3,
        description: "create_batch_jobs_table",
        sql: include_str!("sql/003_create_batch_jobs.sql"),
    },
    Migration {
        version: 4,
        description: "create_oauth_tokens_table",
        sql: include_str!("sql/004_create_oauth_tokens.sql"),
    },
    Migration {
        version: 5,
        description: "create_papers_fts_index",
        sql: include_str!("sql/005_create_papers_fts.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, description) VALUES ({}, '{}');\nCOMMIT;",
            migration.sql, migration.version, migration.description
        );
        if let Err(e) = conn.execute_batch(&batch) {
            // Leave the connection usable if the batch failed mid-transaction.
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
            [name],
            |r| r.get::<_, u32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
        for table in [
            "papers",
            "notes",
            "tags",
            "paper_tags",
            "batch_jobs",
            "oauth_tokens",
            "papers_fts",
        ] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_fts_index_follows_papers() {
        let conn = fresh();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO papers (id, title, submission_url, file_id, view_url, added_at)
             VALUES ('p1', 'Sparse transformers', 'u1', 'f1', 'v1', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let hits: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM papers_fts WHERE papers_fts MATCH 'sparse'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("UPDATE papers SET title = 'Dense models' WHERE id = 'p1'", [])
            .unwrap();
        let hits: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM papers_fts WHERE papers_fts MATCH 'sparse'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);

        conn.execute("DELETE FROM papers WHERE id = 'p1'", []).unwrap();
        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM papers_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
