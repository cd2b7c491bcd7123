#![forbid(unsafe_code)]

use super::rows::decode_resource;
use super::*;
use rl_core::{LockDetail, UNLOCKED};
use std::collections::BTreeMap;
use tracing::info;

impl SqliteStore {
    /// Distinct lock names currently held, ascending.
    pub fn get_locks(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT lock FROM resources WHERE lock<>?1 ORDER BY lock ASC")?;
        let mut rows = stmt.query(params![UNLOCKED])?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            out.push(row.get::<_, String>(0)?);
        }

        Ok(out)
    }

    /// Lock state keyed by identity, for the whole pool or a single resource.
    pub fn get_lock_details(
        &self,
        identity: Option<&str>,
    ) -> Result<BTreeMap<String, LockDetail>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, attributes_json, lock, lock_reason, locked_at_ms FROM resources ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = BTreeMap::new();

        while let Some(row) = rows.next()? {
            let id = row.get::<_, i64>(0)?;
            let attributes_json = row.get::<_, String>(1)?;
            // Decode every row, even when filtering, so corruption is never masked.
            let resource = decode_resource(id, &attributes_json, &self.options.identity_attribute)?;
            if identity.is_some_and(|wanted| wanted != resource.key()) {
                continue;
            }
            out.insert(
                resource.key().to_string(),
                LockDetail {
                    lock: row.get::<_, String>(2)?,
                    reason: row.get::<_, Option<String>>(3)?,
                    locked_at_ms: row.get::<_, Option<i64>>(4)?,
                },
            );
        }

        Ok(out)
    }

    /// Returns every resource held under `lock_name` to the unlocked pool.
    ///
    /// Only the lock name is cleared. The reason and timestamp of the last
    /// claim stay on the row and remain visible through `get_lock_details`.
    pub fn release(&mut self, lock_name: &str) -> Result<usize, StoreError> {
        let lock = canonicalize_lock(lock_name)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let released = tx.execute(
            "UPDATE resources SET lock=?1 WHERE lock=?2",
            params![UNLOCKED, lock.as_str()],
        )?;
        tx.commit()?;

        info!(lock = %lock, released, "released lock");
        Ok(released)
    }
}
