#![forbid(unsafe_code)]

use super::rows::{decode_resource, encode_attributes};
use super::*;
use rl_core::{Attributes, Resource, UNLOCKED};
use rusqlite::Transaction;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug)]
struct CarriedLock {
    lock: String,
    reason: Option<String>,
    locked_at_ms: Option<i64>,
}

impl SqliteStore {
    /// Replaces the whole pool with `descriptors`, in order.
    ///
    /// Lock name, reason and timestamp follow each identity key that is still
    /// present; resources missing from `descriptors` lose their lock with them.
    pub fn set_pool(&mut self, descriptors: Vec<Attributes>) -> Result<(), StoreError> {
        let identity_attribute = self.options.identity_attribute.as_str();

        let resources = descriptors
            .into_iter()
            .map(|attributes| {
                Resource::from_attributes(identity_attribute, attributes)
                    .map_err(|err| StoreError::InvalidInput(err.message()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = BTreeSet::new();
        for resource in &resources {
            if !seen.insert(resource.key()) {
                return Err(StoreError::InvalidInput(
                    "resource identity must be unique within the pool",
                ));
            }
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let carried = current_locks_tx(&tx, identity_attribute)?;

        tx.execute("DELETE FROM resources", [])?;

        let mut carried_count = 0usize;
        for (index, resource) in resources.iter().enumerate() {
            let id = to_sqlite_i64(index)?;
            let attributes_json = encode_attributes(resource.attributes())?;
            match carried.get(resource.key()) {
                Some(prior) => {
                    if prior.lock != UNLOCKED {
                        carried_count += 1;
                    }
                    tx.execute(
                        "INSERT INTO resources(id, attributes_json, lock, lock_reason, locked_at_ms) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            id,
                            attributes_json,
                            prior.lock,
                            prior.reason,
                            prior.locked_at_ms
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO resources(id, attributes_json, lock) VALUES (?1, ?2, ?3)",
                        params![id, attributes_json, UNLOCKED],
                    )?;
                }
            }
        }

        touch_store_state(&tx, now_ms())?;
        tx.commit()?;

        info!(
            resources = resources.len(),
            previous = carried.len(),
            locks_carried = carried_count,
            "replaced resource pool"
        );
        Ok(())
    }

    /// Every resource in the pool, in synchronization order.
    pub fn get_pool(&self) -> Result<Vec<Resource>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, attributes_json FROM resources ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let id = row.get::<_, i64>(0)?;
            let attributes_json = row.get::<_, String>(1)?;
            out.push(decode_resource(
                id,
                &attributes_json,
                &self.options.identity_attribute,
            )?);
        }

        Ok(out)
    }
}

fn current_locks_tx(
    tx: &Transaction<'_>,
    identity_attribute: &str,
) -> Result<BTreeMap<String, CarriedLock>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT id, attributes_json, lock, lock_reason, locked_at_ms FROM resources ORDER BY id ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = BTreeMap::new();

    while let Some(row) = rows.next()? {
        let id = row.get::<_, i64>(0)?;
        let attributes_json = row.get::<_, String>(1)?;
        let resource = decode_resource(id, &attributes_json, identity_attribute)?;
        out.insert(
            resource.key().to_string(),
            CarriedLock {
                lock: row.get::<_, String>(2)?,
                reason: row.get::<_, Option<String>>(3)?,
                locked_at_ms: row.get::<_, Option<i64>>(4)?,
            },
        );
    }

    Ok(out)
}
