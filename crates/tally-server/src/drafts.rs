//! Debounced draft persistence
//!
//! Editors save on every keystroke. Each write replaces the pending value for
//! its key and restarts a quiet-period timer; only the value still pending when
//! the timer fires is written. Reads see pending values immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use tally_core::db::Database;

type DraftKey = (String, String);

struct Pending {
    value: String,
    generation: u64,
}

/// Last-write-wins draft writer
#[derive(Clone)]
pub struct DraftDebouncer {
    db: Database,
    delay: Duration,
    pending: Arc<Mutex<HashMap<DraftKey, Pending>>>,
    generation: Arc<AtomicU64>,
}

impl DraftDebouncer {
    pub fn new(db: Database, delay: Duration) -> Self {
        Self {
            db,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current value of a draft, pending writes included
    pub fn get(&self, user_id: &str, key: &str) -> tally_core::Result<Option<String>> {
        if let Some(value) = self.pending_value(user_id, key) {
            return Ok(Some(value));
        }
        Ok(self.db.get_draft(user_id, key)?.map(|d| d.value))
    }

    /// Schedule a write; with no delay it is written immediately
    pub fn put(&self, user_id: &str, key: &str, value: &str) -> tally_core::Result<()> {
        if self.delay.is_zero() {
            return self.db.put_draft(user_id, key, value);
        }

        let draft_key = (user_id.to_string(), key.to_string());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(
                draft_key.clone(),
                Pending {
                    value: value.to_string(),
                    generation,
                },
            );
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.write_if_current(&draft_key, generation);
        });
        Ok(())
    }

    /// Write every pending draft now
    pub fn flush(&self) {
        let drained: Vec<(DraftKey, Pending)> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => return,
        };
        for ((user_id, key), pending) in drained {
            if let Err(e) = self.db.put_draft(&user_id, &key, &pending.value) {
                warn!(key = %key, error = %e, "Failed to save draft");
            }
        }
    }

    fn pending_value(&self, user_id: &str, key: &str) -> Option<String> {
        let pending = self.pending.lock().ok()?;
        pending
            .get(&(user_id.to_string(), key.to_string()))
            .map(|p| p.value.clone())
    }

    /// Write the pending value if no later write replaced it
    fn write_if_current(&self, draft_key: &DraftKey, generation: u64) {
        let value = {
            let Ok(mut pending) = self.pending.lock() else {
                return;
            };
            match pending.get(draft_key) {
                Some(p) if p.generation == generation => {
                    pending.remove(draft_key).map(|p| p.value)
                }
                _ => None,
            }
        };

        if let Some(value) = value {
            let (user_id, key) = draft_key;
            if let Err(e) = self.db.put_draft(user_id, key, &value) {
                warn!(key = %key, error = %e, "Failed to save draft");
            }
        }
    }
}
