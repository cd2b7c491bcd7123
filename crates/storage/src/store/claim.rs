#![forbid(unsafe_code)]

use super::rows::decode_resource;
use super::*;
use rand::seq::SliceRandom;
use rl_core::select::{self, Decision, Selector};
use rl_core::{Resource, UNLOCKED};
use rusqlite::Transaction;
use tracing::{debug, info, warn};

impl SqliteStore {
    /// Locks every unlocked resource the selector decides to take.
    ///
    /// Runs under an exclusive transaction: no concurrent claim can see the
    /// candidates read here until this call commits or rolls back. Candidates
    /// are visited in a shuffled order. The selector's `begin` runs first, then
    /// every candidate is evaluated before the first decision runs. Returns the
    /// claimed resources in claim order.
    pub fn claim(
        &mut self,
        request: ClaimRequest,
        selector: &dyn Selector,
    ) -> Result<Vec<Resource>, StoreError> {
        let ClaimRequest { lock_name, reason } = request;
        let lock = canonicalize_lock(&lock_name)?;
        let reason = reason.unwrap_or_default();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)?;

        let mut candidates = unlocked_candidates_tx(&tx, &self.options.identity_attribute)?;
        candidates.shuffle(&mut self.rng);
        debug!(lock = %lock, candidates = candidates.len(), "claim candidates loaded");

        selector.begin();
        let decisions: Vec<Decision<'_>> = candidates
            .iter()
            .map(|(_, resource)| selector.evaluate(resource))
            .collect();

        let locked_at_ms = now_ms();
        let mut claimed = Vec::new();
        for ((id, resource), decision) in candidates.iter().zip(decisions) {
            if !decision.decide() {
                continue;
            }
            let affected = tx.execute(
                "UPDATE resources SET lock=?2, lock_reason=?3, locked_at_ms=?4 \
                 WHERE id=?1 AND lock=?5",
                params![id, lock.as_str(), reason, locked_at_ms, UNLOCKED],
            )?;
            if affected != 1 {
                warn!(
                    lock = %lock,
                    id = *id,
                    affected,
                    "lock update did not touch exactly one row; rolling back claim"
                );
                return Err(StoreError::Inconsistent { id: *id, affected });
            }
            claimed.push(resource.clone());
        }

        tx.commit()?;

        info!(lock = %lock, claimed = claimed.len(), "claimed resources");
        Ok(claimed)
    }

    /// Claims every currently unlocked resource.
    pub fn claim_all(&mut self, request: ClaimRequest) -> Result<Vec<Resource>, StoreError> {
        self.claim(request, &select::all())
    }
}

fn unlocked_candidates_tx(
    tx: &Transaction<'_>,
    identity_attribute: &str,
) -> Result<Vec<(i64, Resource)>, StoreError> {
    let mut stmt =
        tx.prepare("SELECT id, attributes_json FROM resources WHERE lock=?1 ORDER BY id ASC")?;
    let mut rows = stmt.query(params![UNLOCKED])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let id = row.get::<_, i64>(0)?;
        let attributes_json = row.get::<_, String>(1)?;
        out.push((id, decode_resource(id, &attributes_json, identity_attribute)?));
    }

    Ok(out)
}
