use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use time::OffsetDateTime;

use super::{EeLookup, EndEntityRecord, EndEntityRegistry, EndEntityTransaction, NewEndEntity};

#[derive(Default)]
struct State {
    records: Vec<EndEntityRecord>,
    /// Signers with an open scope.
    busy: HashSet<String>,
}

/// Registry held in memory, with one exclusive scope per signer at a time.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    released: Condvar,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed record of `signer_id`, oldest first.
    pub fn records(&self, signer_id: &str) -> Vec<EndEntityRecord> {
        self.lock()
            .map(|state| {
                state
                    .records
                    .iter()
                    .filter(|r| r.signer_id == signer_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Inserts a committed record as-is, bypassing the scope. Used to seed state.
    pub fn seed(&self, record: EndEntityRecord) -> Result<()> {
        self.lock()?.records.push(record);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("end-entity registry lock poisoned"))
    }

    fn release(&self, signer_id: &str) {
        // a poisoned lock must not leave the signer busy forever
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.busy.remove(signer_id);
        drop(state);
        self.released.notify_all();
    }
}

impl EndEntityRegistry for MemoryRegistry {
    fn begin_end_entity_operations<'a>(
        &'a self,
        signer_id: &str,
    ) -> Result<Box<dyn EndEntityTransaction + 'a>> {
        if signer_id.is_empty() {
            bail!("cannot open end-entity operations without a signer id");
        }
        let mut state = self.lock()?;
        while state.busy.contains(signer_id) {
            state = self
                .released
                .wait(state)
                .map_err(|_| anyhow!("end-entity registry lock poisoned"))?;
        }
        state.busy.insert(signer_id.to_string());
        Ok(Box::new(MemoryTransaction {
            registry: self,
            signer_id: signer_id.to_string(),
            pending: Vec::new(),
            open: true,
        }))
    }
}

struct MemoryTransaction<'a> {
    registry: &'a MemoryRegistry,
    signer_id: String,
    pending: Vec<EndEntityRecord>,
    open: bool,
}

impl EndEntityTransaction for MemoryTransaction<'_> {
    fn find_suitable_ee(&mut self, signer_id: &str, validity: Duration) -> Result<EeLookup> {
        if signer_id != self.signer_id {
            bail!(
                "scope for signer {:?} cannot look up signer {signer_id:?}",
                self.signer_id
            );
        }
        let now = OffsetDateTime::now_utc();
        let state = self.registry.lock()?;
        let found = state
            .records
            .iter()
            .chain(self.pending.iter())
            .filter(|r| r.signer_id == signer_id && r.is_current)
            .filter(|r| r.created_at + validity > now)
            .max_by_key(|r| r.created_at)
            .cloned();
        Ok(match found {
            Some(record) => EeLookup::Found(record),
            None => EeLookup::NotFound,
        })
    }

    fn insert_ee(&mut self, ee: NewEndEntity) -> Result<()> {
        if ee.signer_id != self.signer_id {
            bail!(
                "scope for signer {:?} cannot insert an end-entity of {:?}",
                self.signer_id,
                ee.signer_id
            );
        }
        for record in &mut self.pending {
            record.is_current = false;
        }
        self.pending.push(EndEntityRecord {
            label: ee.label,
            signer_id: ee.signer_id,
            x5u: ee.x5u,
            key_handle: ee.key_handle,
            created_at: OffsetDateTime::now_utc(),
            is_current: true,
        });
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        {
            let mut state = self.registry.lock()?;
            if !pending.is_empty() {
                for record in state.records.iter_mut() {
                    if record.signer_id == self.signer_id {
                        record.is_current = false;
                    }
                }
            }
            state.records.extend(pending);
        }
        self.open = false;
        self.registry.release(&self.signer_id);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            tracing::debug!(signer = %self.signer_id, "rolling back end-entity operations");
            self.registry.release(&self.signer_id);
        }
    }
}
