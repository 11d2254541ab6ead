use tracing::info;

use super::YieldTable;
use crate::store::{StoreError, YieldStore};

/// Union `incoming` into `existing`. A date present in both keeps the incoming
/// row, since it was harvested more recently. When `persist` is given the
/// merged table is saved before it is returned.
pub fn merge(
    existing: YieldTable,
    incoming: YieldTable,
    persist: Option<&YieldStore>,
) -> Result<YieldTable, StoreError> {
    let before = existing.len();
    let mut merged = existing;
    let mut replaced = 0;
    for record in incoming {
        if merged.insert(record).is_some() {
            replaced += 1;
        }
    }
    info!(
        existing = before,
        added = merged.len() - before,
        replaced,
        total = merged.len(),
        "merged yield tables"
    );

    if let Some(store) = persist {
        store.save(&merged)?;
    }
    Ok(merged)
}
