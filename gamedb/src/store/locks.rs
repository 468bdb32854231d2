use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One write lock per table. Writers to the same table serialize, writers to
/// different tables do not contend here.
#[derive(Default)]
pub(crate) struct TableLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl TableLocks {
    /// Lock handles for the given tables, deduplicated and in id order so
    /// multi-table writers always acquire in the same order.
    pub(crate) fn handles(&self, table_ids: &[i64]) -> Vec<Arc<Mutex<()>>> {
        let mut ids = table_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        ids.into_iter()
            .map(|id| Arc::clone(locks.entry(id).or_default()))
            .collect()
    }

    /// Drop the lock of a table that no longer exists.
    pub(crate) fn forget(&self, table_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&table_id);
    }
}
