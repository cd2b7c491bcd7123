#![forbid(unsafe_code)]

mod claim;
mod error;
mod locks;
mod options;
mod pool;
mod requests;
mod rows;

pub use error::StoreError;
pub use options::*;
pub use requests::*;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rl_core::ids::LockName;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

/// Handle on one resource lock database.
///
/// Every operation runs in its own transaction and re-reads what it needs;
/// nothing about the pool is cached between calls. Independent processes
/// coordinate by opening their own handle on the same directory.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    options: StoreOptions,
    rng: StdRng,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(storage_dir, StoreOptions::default())
    }

    pub fn open_with(
        storage_dir: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        if options.identity_attribute.is_empty() {
            return Err(StoreError::InvalidInput(
                "identity attribute must not be empty",
            ));
        }
        if options.db_file_name.is_empty() {
            return Err(StoreError::InvalidInput("db file name must not be empty"));
        }

        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(&options.db_file_name);
        let mut conn = Connection::open(&db_path)?;
        conn.busy_timeout(options.busy_timeout)?;

        // Gate and install under one write lock so a concurrent first open
        // never observes a half-created schema.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        preflight_gate(&tx)?;
        install_schema(&tx)?;
        tx.commit()?;

        let rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(
            path = %db_path.display(),
            identity_attribute = %options.identity_attribute,
            seeded = options.shuffle_seed.is_some(),
            "opened resource lock store"
        );

        Ok(Self {
            conn,
            storage_dir,
            options,
            rng,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

const STORE_TABLES: [&str; 2] = ["resources", "store_state"];
const RESOURCE_COLUMNS: [&str; 5] = [
    "id",
    "attributes_json",
    "lock",
    "lock_reason",
    "locked_at_ms",
];

/// Refuses any database this store did not lay out itself. A file with no
/// tables at all is fresh and gets the schema installed.
fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let tables = query_names(
        conn,
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    if tables.is_empty() {
        return Ok(());
    }
    if tables != STORE_TABLES {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: database is not a resource lock store",
        ));
    }

    let columns = query_names(
        conn,
        "SELECT name FROM pragma_table_info('resources') ORDER BY cid",
    )?;
    if columns != RESOURCE_COLUMNS {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: resources table layout differs",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if version != Some(SCHEMA_VERSION) {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        ));
    }
    Ok(())
}

fn query_names(conn: &Connection, sql: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS resources (
          id INTEGER PRIMARY KEY,
          attributes_json TEXT NOT NULL,
          lock TEXT NOT NULL DEFAULT '',
          lock_reason TEXT,
          locked_at_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_resources_lock ON resources(lock);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO NOTHING",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn touch_store_state(conn: &Connection, now_ms: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE store_state SET updated_at_ms=?1 WHERE singleton=1",
        params![now_ms],
    )?;
    Ok(())
}

fn canonicalize_lock(value: &str) -> Result<LockName, StoreError> {
    LockName::try_new(value).map_err(|err| StoreError::InvalidInput(err.message()))
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
