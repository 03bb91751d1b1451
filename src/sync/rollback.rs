use tracing::warn;

use crate::prelude::*;
use crate::store::Store;

/// Hard cap on how far back we are willing to walk: two days of slots. A
/// fork deeper than the chain's security parameter means the node or the
/// store is unrecoverably out of sync.
pub const MAX_ALLOWED_ROLLBACK: u64 = 2 * 86400 / 20;

/// Walks the stored (created slot, block hash) history backwards, one block
/// at a time, and truncates the store at the chosen point.
pub struct RollbackHandler {
    store: Store,
    original_slot: BlockSlot,
    slot: BlockSlot,
    block_hash: BlockHash,
}

impl RollbackHandler {
    pub fn new(store: &Store) -> Result<Self, Error> {
        let (slot, block_hash) = store
            .max_slot_block()?
            .ok_or_else(|| Error::message("no blocks to roll back"))?;

        warn!(slot, hash = %block_hash, "starting rollback");

        Ok(Self {
            store: store.clone(),
            original_slot: slot,
            slot,
            block_hash,
        })
    }

    pub fn cursor(&self) -> Point {
        Point {
            slot: self.slot,
            id: self.block_hash.clone(),
        }
    }

    /// Advances one stored block backwards and returns the new cursor.
    pub fn prev_block(&mut self) -> Result<Point, Error> {
        if (self.original_slot - self.slot) >= MAX_ALLOWED_ROLLBACK {
            return Err(Error::ExceededRollback);
        }

        let (slot, block_hash) = self
            .store
            .block_before(self.slot)?
            .ok_or_else(|| Error::message("no more blocks to roll back"))?;

        self.slot = slot;
        self.block_hash = block_hash;

        warn!(
            depth = self.original_slot - self.slot,
            slot = self.slot,
            hash = %self.block_hash,
            "rolled back"
        );

        Ok(self.cursor())
    }

    /// Deletes everything newer than the current cursor. Safe to re-run.
    pub fn rollback(&self) -> Result<(), Error> {
        warn!(slot = self.slot, hash = %self.block_hash, "executing rollback");

        self.store.remove_created_after(self.slot)?;

        Ok(())
    }
}
