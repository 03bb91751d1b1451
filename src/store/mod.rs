//! Persistent store gateway. All durable state lives in a single redb
//! database: primary rows are bincode payloads, secondary multimap tables
//! index them by slot for the rollback walk and the eviction sweep. Every
//! mutation triggered by a block runs inside one [`BlockWriter`] scope that
//! either commits entirely or is discarded.

use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::model::*;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    DatabaseError(#[from] ::redb::DatabaseError),

    #[error(transparent)]
    TransactionError(Box<::redb::TransactionError>),

    #[error(transparent)]
    CommitError(#[from] ::redb::CommitError),

    #[error(transparent)]
    TableError(#[from] ::redb::TableError),

    #[error(transparent)]
    StorageError(#[from] ::redb::StorageError),

    #[error("row encoding error: {0}")]
    EncodingError(#[from] bincode::Error),
}

impl From<::redb::TransactionError> for StoreError {
    fn from(error: ::redb::TransactionError) -> Self {
        StoreError::TransactionError(Box::new(error))
    }
}

type UtxoTable = TableDefinition<'static, &'static str, &'static [u8]>;
type SlotIndex = MultimapTableDefinition<'static, u64, &'static str>;

const UTXOS: UtxoTable = TableDefinition::new("utxos");
const UTXOS_BY_CREATED: SlotIndex = MultimapTableDefinition::new("utxos_by_created");
const UTXOS_BY_SPENT: SlotIndex = MultimapTableDefinition::new("utxos_by_spent");

/// Distinct (created slot, block hash) history, the spine of the rollback
/// walk.
const BLOCKS: TableDefinition<'static, u64, &'static str> = TableDefinition::new("blocks");

const ORDERS: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("orders");
const ORDERS_BY_SLOT: SlotIndex = MultimapTableDefinition::new("orders_by_slot");

const TXS: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("txs");
const TXS_BY_SLOT: MultimapTableDefinition<'static, u64, u64> =
    MultimapTableDefinition::new("txs_by_slot");
const TXS_BY_BATCHER: MultimapTableDefinition<'static, u64, u64> =
    MultimapTableDefinition::new("txs_by_batcher");

const BATCHERS: TableDefinition<'static, u64, ()> = TableDefinition::new("batchers");
const BATCHER_ADDRESSES: TableDefinition<'static, &'static str, u64> =
    TableDefinition::new("batcher_addresses");
const ADDRESSES_BY_BATCHER: MultimapTableDefinition<'static, u64, &'static str> =
    MultimapTableDefinition::new("addresses_by_batcher");

fn encode_row<T: Serialize>(row: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(row)?)
}

fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let out = Self { db: Arc::new(db) };
        out.initialize()?;

        Ok(out)
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let wx = self.db.begin_write()?;

        wx.open_table(UTXOS)?;
        wx.open_multimap_table(UTXOS_BY_CREATED)?;
        wx.open_multimap_table(UTXOS_BY_SPENT)?;
        wx.open_table(BLOCKS)?;
        wx.open_table(ORDERS)?;
        wx.open_multimap_table(ORDERS_BY_SLOT)?;
        wx.open_table(TXS)?;
        wx.open_multimap_table(TXS_BY_SLOT)?;
        wx.open_multimap_table(TXS_BY_BATCHER)?;
        wx.open_table(BATCHERS)?;
        wx.open_table(BATCHER_ADDRESSES)?;
        wx.open_multimap_table(ADDRESSES_BY_BATCHER)?;

        wx.commit()?;

        Ok(())
    }

    /// Opens the scoped write transaction covering one block.
    pub fn start_block(&self) -> Result<BlockWriter, StoreError> {
        Ok(BlockWriter {
            wx: self.db.begin_write()?,
        })
    }

    /// The most recent (created slot, block hash) pair seen by the store.
    pub fn max_slot_block(&self) -> Result<Option<(BlockSlot, BlockHash)>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(BLOCKS)?;

        let out = table
            .last()?
            .map(|(k, v)| (k.value(), v.value().to_string()));

        Ok(out)
    }

    /// The closest (slot, hash) pair strictly before the given slot.
    pub fn block_before(&self, slot: BlockSlot) -> Result<Option<(BlockSlot, BlockHash)>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(BLOCKS)?;

        let out = table
            .range(..slot)?
            .next_back()
            .transpose()?
            .map(|(k, v)| (k.value(), v.value().to_string()));

        Ok(out)
    }

    pub fn utxo(&self, id: &str) -> Result<Option<UtxoRow>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(UTXOS)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Ids of all orders not yet linked to a consuming transaction.
    pub fn open_order_ids(&self) -> Result<HashSet<String>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(ORDERS)?;

        let mut out = HashSet::new();

        for entry in table.iter()? {
            let (id, row) = entry?;
            let row: OrderRow = decode_row(row.value())?;

            if row.transaction_id.is_none() {
                out.insert(id.value().to_string());
            }
        }

        Ok(out)
    }

    pub fn order(&self, id: &str) -> Result<Option<OrderRow>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(ORDERS)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn transaction(&self, id: TxId) -> Result<Option<TxRow>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(TXS)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn batcher_for_address(&self, address: &str) -> Result<Option<BatcherId>, StoreError> {
        let rx = self.db.begin_read()?;
        let table = rx.open_table(BATCHER_ADDRESSES)?;

        Ok(table.get(address)?.map(|guard| guard.value()))
    }

    /// All batchers with their addresses and transaction counts.
    pub fn batcher_summaries(&self) -> Result<Vec<(BatcherId, Vec<String>, u64)>, StoreError> {
        let rx = self.db.begin_read()?;
        let batchers = rx.open_table(BATCHERS)?;
        let addresses = rx.open_multimap_table(ADDRESSES_BY_BATCHER)?;
        let txs = rx.open_multimap_table(TXS_BY_BATCHER)?;

        let mut out = vec![];

        for entry in batchers.iter()? {
            let (id, _) = entry?;
            let id = id.value();

            let mut addrs = vec![];
            for addr in addresses.get(id)? {
                addrs.push(addr?.value().to_string());
            }

            let count = txs.get(id)?.count() as u64;

            out.push((id, addrs, count));
        }

        Ok(out)
    }

    pub fn batcher_transactions(&self, batcher: BatcherId) -> Result<Vec<TxRow>, StoreError> {
        let rx = self.db.begin_read()?;
        let index = rx.open_multimap_table(TXS_BY_BATCHER)?;
        let txs = rx.open_table(TXS)?;

        let mut out = vec![];

        for id in index.get(batcher)? {
            let id = id?.value();

            if let Some(row) = txs.get(id)? {
                out.push(decode_row(row.value())?);
            }
        }

        Ok(out)
    }

    /// Deletes every utxo spent before the given slot, along with its index
    /// entries. Block history older than the rollback window is pruned at
    /// the same time. Returns the number of removed utxos.
    pub fn remove_spent_before(&self, slot: BlockSlot) -> Result<u64, StoreError> {
        let wx = self.db.begin_write()?;
        let mut removed = 0;

        {
            let mut utxos = wx.open_table(UTXOS)?;
            let mut by_created = wx.open_multimap_table(UTXOS_BY_CREATED)?;
            let mut by_spent = wx.open_multimap_table(UTXOS_BY_SPENT)?;
            let mut blocks = wx.open_table(BLOCKS)?;

            let mut doomed = vec![];

            for entry in by_spent.range(..slot)? {
                let (spent_slot, ids) = entry?;
                for id in ids {
                    doomed.push((spent_slot.value(), id?.value().to_string()));
                }
            }

            for (spent_slot, id) in doomed {
                if let Some(guard) = utxos.remove(id.as_str())? {
                    let row: UtxoRow = decode_row(guard.value())?;
                    drop(guard);

                    by_created.remove(row.created_slot, id.as_str())?;
                    removed += 1;
                }

                by_spent.remove(spent_slot, id.as_str())?;
            }

            // block history only needs to cover the maximal rollback depth
            let cutoff = slot.saturating_sub(86400);
            let stale: Vec<u64> = blocks
                .range(..cutoff)?
                .map(|entry| entry.map(|(k, _)| k.value()))
                .collect::<Result<_, _>>()?;

            for key in stale {
                blocks.remove(key)?;
            }
        }

        wx.commit()?;

        Ok(removed)
    }

    /// Truncates the store back to the given slot: utxos created later,
    /// orders placed later and transactions settled later are removed, and
    /// orders whose consuming transaction was removed revert to open.
    pub fn remove_created_after(&self, slot: BlockSlot) -> Result<(), StoreError> {
        let wx = self.db.begin_write()?;

        {
            let mut utxos = wx.open_table(UTXOS)?;
            let mut by_created = wx.open_multimap_table(UTXOS_BY_CREATED)?;
            let mut by_spent = wx.open_multimap_table(UTXOS_BY_SPENT)?;
            let mut blocks = wx.open_table(BLOCKS)?;
            let mut orders = wx.open_table(ORDERS)?;
            let mut orders_by_slot = wx.open_multimap_table(ORDERS_BY_SLOT)?;
            let mut txs = wx.open_table(TXS)?;
            let mut txs_by_slot = wx.open_multimap_table(TXS_BY_SLOT)?;
            let mut txs_by_batcher = wx.open_multimap_table(TXS_BY_BATCHER)?;

            let mut doomed_utxos = vec![];
            for entry in by_created.range(slot + 1..)? {
                let (created_slot, ids) = entry?;
                for id in ids {
                    doomed_utxos.push((created_slot.value(), id?.value().to_string()));
                }
            }

            for (created_slot, id) in doomed_utxos {
                if let Some(guard) = utxos.remove(id.as_str())? {
                    let row: UtxoRow = decode_row(guard.value())?;
                    drop(guard);

                    if let Some(spent_slot) = row.spent_slot {
                        by_spent.remove(spent_slot, id.as_str())?;
                    }
                }

                by_created.remove(created_slot, id.as_str())?;
            }

            let stale_blocks: Vec<u64> = blocks
                .range(slot + 1..)?
                .map(|entry| entry.map(|(k, _)| k.value()))
                .collect::<Result<_, _>>()?;

            for key in stale_blocks {
                blocks.remove(key)?;
            }

            let mut doomed_orders = vec![];
            for entry in orders_by_slot.range(slot + 1..)? {
                let (placed_slot, ids) = entry?;
                for id in ids {
                    doomed_orders.push((placed_slot.value(), id?.value().to_string()));
                }
            }

            for (placed_slot, id) in doomed_orders {
                orders.remove(id.as_str())?;
                orders_by_slot.remove(placed_slot, id.as_str())?;
            }

            let mut doomed_txs = vec![];
            for entry in txs_by_slot.range(slot + 1..)? {
                let (tx_slot, ids) = entry?;
                for id in ids {
                    doomed_txs.push((tx_slot.value(), id?.value()));
                }
            }

            for (tx_slot, id) in doomed_txs {
                if let Some(guard) = txs.remove(id)? {
                    let row: TxRow = decode_row(guard.value())?;
                    drop(guard);

                    // surviving orders of a removed transaction become open again
                    for order_id in row.order_ids.iter() {
                        let survivor = match orders.get(order_id.as_str())? {
                            Some(guard) => Some(decode_row::<OrderRow>(guard.value())?),
                            None => None,
                        };

                        if let Some(mut order) = survivor {
                            order.transaction_id = None;
                            orders.insert(order_id.as_str(), encode_row(&order)?.as_slice())?;
                        }
                    }

                    if let Some(batcher) = row.batcher_id {
                        txs_by_batcher.remove(batcher, id)?;
                    }
                }

                txs_by_slot.remove(tx_slot, id)?;
            }
        }

        wx.commit()?;

        Ok(())
    }
}

/// Write scope covering a single block. Dropping the writer without calling
/// [`BlockWriter::commit`] discards every staged change.
pub struct BlockWriter {
    wx: WriteTransaction,
}

impl BlockWriter {
    pub fn upsert_utxo(&self, id: &str, row: &UtxoRow) -> Result<(), StoreError> {
        let mut utxos = self.wx.open_table(UTXOS)?;
        let mut by_created = self.wx.open_multimap_table(UTXOS_BY_CREATED)?;
        let mut blocks = self.wx.open_table(BLOCKS)?;

        utxos.insert(id, encode_row(row)?.as_slice())?;
        by_created.insert(row.created_slot, id)?;

        if !row.block_hash.is_empty() {
            blocks.insert(row.created_slot, row.block_hash.as_str())?;
        }

        Ok(())
    }

    /// Marks a stored utxo as spent. The mark is written once; a utxo
    /// already spent keeps its original spent slot.
    pub fn mark_spent(&self, id: &str, slot: BlockSlot) -> Result<bool, StoreError> {
        let mut utxos = self.wx.open_table(UTXOS)?;
        let mut by_spent = self.wx.open_multimap_table(UTXOS_BY_SPENT)?;

        let row = match utxos.get(id)? {
            Some(guard) => Some(decode_row::<UtxoRow>(guard.value())?),
            None => None,
        };

        match row {
            Some(mut row) if row.spent_slot.is_none() => {
                row.spent_slot = Some(slot);
                utxos.insert(id, encode_row(&row)?.as_slice())?;
                by_spent.insert(slot, id)?;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    pub fn insert_order(&self, id: &str, row: &OrderRow) -> Result<(), StoreError> {
        let mut orders = self.wx.open_table(ORDERS)?;
        let mut by_slot = self.wx.open_multimap_table(ORDERS_BY_SLOT)?;

        orders.insert(id, encode_row(row)?.as_slice())?;
        by_slot.insert(row.placed_slot, id)?;

        Ok(())
    }

    /// Utxo rows visible to this block, staged writes included.
    pub fn utxos(&self, ids: &[String]) -> Result<Vec<(String, UtxoRow)>, StoreError> {
        let utxos = self.wx.open_table(UTXOS)?;

        let mut out = vec![];

        for id in ids {
            if let Some(guard) = utxos.get(id.as_str())? {
                out.push((id.clone(), decode_row(guard.value())?));
            }
        }

        Ok(out)
    }

    pub fn orders(&self, ids: &[String]) -> Result<Vec<(String, OrderRow)>, StoreError> {
        let orders = self.wx.open_table(ORDERS)?;

        let mut out = vec![];

        for id in ids {
            if let Some(guard) = orders.get(id.as_str())? {
                out.push((id.clone(), decode_row(guard.value())?));
            }
        }

        Ok(out)
    }

    /// Persists a batch transaction and links the consumed orders to it.
    pub fn insert_transaction(&self, row: &TxRow) -> Result<TxId, StoreError> {
        let mut txs = self.wx.open_table(TXS)?;
        let mut by_slot = self.wx.open_multimap_table(TXS_BY_SLOT)?;
        let mut by_batcher = self.wx.open_multimap_table(TXS_BY_BATCHER)?;
        let mut orders = self.wx.open_table(ORDERS)?;

        let id = match txs.last()? {
            Some((k, _)) => k.value() + 1,
            None => 1,
        };

        txs.insert(id, encode_row(row)?.as_slice())?;
        by_slot.insert(row.slot, id)?;

        if let Some(batcher) = row.batcher_id {
            by_batcher.insert(batcher, id)?;
        }

        for order_id in row.order_ids.iter() {
            let staged = match orders.get(order_id.as_str())? {
                Some(guard) => Some(decode_row::<OrderRow>(guard.value())?),
                None => None,
            };

            if let Some(mut order) = staged {
                order.transaction_id = Some(id);
                orders.insert(order_id.as_str(), encode_row(&order)?.as_slice())?;
            }
        }

        Ok(id)
    }

    pub fn find_batcher(&self, address: &str) -> Result<Option<BatcherId>, StoreError> {
        let table = self.wx.open_table(BATCHER_ADDRESSES)?;

        let result = table.get(address)?.map(|guard| guard.value());
        Ok(result)
    }

    pub fn create_batcher(&self) -> Result<BatcherId, StoreError> {
        let mut batchers = self.wx.open_table(BATCHERS)?;

        let id = match batchers.last()? {
            Some((k, _)) => k.value() + 1,
            None => 1,
        };

        batchers.insert(id, ())?;

        Ok(id)
    }

    pub fn link_address(&self, address: &str, batcher: BatcherId) -> Result<(), StoreError> {
        let mut addresses = self.wx.open_table(BATCHER_ADDRESSES)?;
        let mut by_batcher = self.wx.open_multimap_table(ADDRESSES_BY_BATCHER)?;

        addresses.insert(address, batcher)?;
        by_batcher.insert(batcher, address)?;

        Ok(())
    }

    /// Rewires every address and historical transaction of `other` onto
    /// `canonical`, then deletes `other`.
    pub fn merge_batchers(&self, canonical: BatcherId, other: BatcherId) -> Result<(), StoreError> {
        let mut batchers = self.wx.open_table(BATCHERS)?;
        let mut addresses = self.wx.open_table(BATCHER_ADDRESSES)?;
        let mut addrs_by_batcher = self.wx.open_multimap_table(ADDRESSES_BY_BATCHER)?;
        let mut txs = self.wx.open_table(TXS)?;
        let mut txs_by_batcher = self.wx.open_multimap_table(TXS_BY_BATCHER)?;

        let moved_addresses: Vec<String> = addrs_by_batcher
            .get(other)?
            .map(|guard| guard.map(|g| g.value().to_string()))
            .collect::<Result<_, _>>()?;

        for address in moved_addresses {
            addresses.insert(address.as_str(), canonical)?;
            addrs_by_batcher.remove(other, address.as_str())?;
            addrs_by_batcher.insert(canonical, address.as_str())?;
        }

        let moved_txs: Vec<TxId> = txs_by_batcher
            .get(other)?
            .map(|guard| guard.map(|g| g.value()))
            .collect::<Result<_, _>>()?;

        for id in moved_txs {
            let row = match txs.get(id)? {
                Some(guard) => Some(decode_row::<TxRow>(guard.value())?),
                None => None,
            };

            if let Some(mut row) = row {
                row.batcher_id = Some(canonical);
                txs.insert(id, encode_row(&row)?.as_slice())?;
            }

            txs_by_batcher.remove(other, id)?;
            txs_by_batcher.insert(canonical, id)?;
        }

        batchers.remove(other)?;

        Ok(())
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.wx.commit()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("granola.redb")).unwrap();
        (dir, store)
    }

    fn utxo_row(slot: BlockSlot, hash: &str) -> UtxoRow {
        let mut value = TokenValue::default();
        value.add(Token::lovelace(), 2_000_000);

        UtxoRow {
            owner: "addr_test".to_string(),
            value,
            created_slot: slot,
            spent_slot: None,
            block_hash: hash.to_string(),
        }
    }

    fn order_row(slot: BlockSlot) -> OrderRow {
        OrderRow {
            sender: "aa".repeat(28),
            recipient: "aa".repeat(28),
            placed_slot: slot,
            transaction_id: None,
        }
    }

    #[test]
    fn utxo_upsert_and_read_back() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        writer.upsert_utxo("aaaa#0", &utxo_row(100, "h100")).unwrap();
        writer.commit().unwrap();

        let row = store.utxo("aaaa#0").unwrap().unwrap();
        assert_eq!(row.created_slot, 100);
        assert_eq!(store.utxo("aaaa#1").unwrap(), None);
    }

    #[test]
    fn uncommitted_writer_discards_changes() {
        let (_dir, store) = temp_store();

        {
            let writer = store.start_block().unwrap();
            writer.upsert_utxo("aaaa#0", &utxo_row(100, "h100")).unwrap();
        }

        assert_eq!(store.utxo("aaaa#0").unwrap(), None);
    }

    #[test]
    fn spent_mark_is_written_once() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        writer.upsert_utxo("aaaa#0", &utxo_row(100, "h100")).unwrap();
        writer.commit().unwrap();

        let writer = store.start_block().unwrap();
        assert!(writer.mark_spent("aaaa#0", 105).unwrap());
        assert!(writer.mark_spent("aaaa#0", 110).unwrap());
        assert!(!writer.mark_spent("bbbb#0", 105).unwrap());
        writer.commit().unwrap();

        let row = store.utxo("aaaa#0").unwrap().unwrap();
        assert_eq!(row.spent_slot, Some(105));
        assert!(row.spent_slot.unwrap() >= row.created_slot);
    }

    #[test]
    fn max_slot_block_tracks_history() {
        let (_dir, store) = temp_store();

        assert_eq!(store.max_slot_block().unwrap(), None);

        let writer = store.start_block().unwrap();
        writer.upsert_utxo("aaaa#0", &utxo_row(98, "h98")).unwrap();
        writer.upsert_utxo("bbbb#0", &utxo_row(99, "h99")).unwrap();
        writer.upsert_utxo("cccc#0", &utxo_row(100, "h100")).unwrap();
        writer.commit().unwrap();

        assert_eq!(
            store.max_slot_block().unwrap(),
            Some((100, "h100".to_string()))
        );

        assert_eq!(store.block_before(100).unwrap(), Some((99, "h99".to_string())));
        assert_eq!(store.block_before(99).unwrap(), Some((98, "h98".to_string())));
        assert_eq!(store.block_before(98).unwrap(), None);
    }

    #[test]
    fn open_orders_follow_transaction_links() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        writer.insert_order("aaaa#0", &order_row(100)).unwrap();
        writer.insert_order("bbbb#0", &order_row(101)).unwrap();
        writer.commit().unwrap();

        assert_eq!(store.open_order_ids().unwrap().len(), 2);

        let writer = store.start_block().unwrap();
        let tx_id = writer
            .insert_transaction(&TxRow {
                tx_hash: "cccc".to_string(),
                slot: 102,
                batcher_id: None,
                ada_profit: 0,
                network_fee: 0,
                equivalent_ada: 0,
                net_assets: Default::default(),
                order_ids: vec!["aaaa#0".to_string()],
            })
            .unwrap();
        writer.commit().unwrap();

        let open = store.open_order_ids().unwrap();
        assert!(!open.contains("aaaa#0"));
        assert!(open.contains("bbbb#0"));

        let order = store.order("aaaa#0").unwrap().unwrap();
        assert_eq!(order.transaction_id, Some(tx_id));
    }

    #[test]
    fn rollback_truncates_and_reopens_orders() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        writer.upsert_utxo("aaaa#0", &utxo_row(98, "h98")).unwrap();
        writer.insert_order("bbbb#0", &order_row(98)).unwrap();
        writer.commit().unwrap();

        // a later block consumes the order and creates new state
        let writer = store.start_block().unwrap();
        writer.upsert_utxo("cccc#0", &utxo_row(100, "h100")).unwrap();
        writer.insert_order("dddd#0", &order_row(100)).unwrap();
        writer
            .insert_transaction(&TxRow {
                tx_hash: "eeee".to_string(),
                slot: 100,
                batcher_id: None,
                ada_profit: 0,
                network_fee: 0,
                equivalent_ada: 0,
                net_assets: Default::default(),
                order_ids: vec!["bbbb#0".to_string()],
            })
            .unwrap();
        writer.commit().unwrap();

        store.remove_created_after(98).unwrap();

        // everything created after slot 98 is gone
        assert_eq!(store.utxo("cccc#0").unwrap(), None);
        assert_eq!(store.order("dddd#0").unwrap(), None);
        assert_eq!(store.transaction(1).unwrap(), None);
        assert_eq!(store.max_slot_block().unwrap(), Some((98, "h98".to_string())));

        // the surviving order reverted to open
        let order = store.order("bbbb#0").unwrap().unwrap();
        assert_eq!(order.transaction_id, None);
        assert!(store.open_order_ids().unwrap().contains("bbbb#0"));

        // re-running is idempotent
        store.remove_created_after(98).unwrap();
        assert_eq!(store.utxo("aaaa#0").unwrap().map(|x| x.created_slot), Some(98));
    }

    #[test]
    fn eviction_removes_exactly_the_stale_spent() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        writer.upsert_utxo("old_spent#0", &utxo_row(100, "h100")).unwrap();
        writer.upsert_utxo("new_spent#0", &utxo_row(100, "h100")).unwrap();
        writer.upsert_utxo("unspent#0", &utxo_row(100, "h100")).unwrap();
        writer.mark_spent("old_spent#0", 150).unwrap();
        writer.mark_spent("new_spent#0", 500).unwrap();
        writer.commit().unwrap();

        let removed = store.remove_spent_before(200).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.utxo("old_spent#0").unwrap(), None);
        assert!(store.utxo("new_spent#0").unwrap().is_some());
        assert!(store.utxo("unspent#0").unwrap().is_some());
    }

    #[test]
    fn address_belongs_to_one_batcher() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        let b1 = writer.create_batcher().unwrap();
        writer.link_address("addr_x", b1).unwrap();
        writer.commit().unwrap();

        assert_eq!(store.batcher_for_address("addr_x").unwrap(), Some(b1));
        assert_eq!(store.batcher_for_address("addr_y").unwrap(), None);
    }

    #[test]
    fn merge_rewires_addresses_and_transactions() {
        let (_dir, store) = temp_store();

        let writer = store.start_block().unwrap();
        let b1 = writer.create_batcher().unwrap();
        let b2 = writer.create_batcher().unwrap();
        writer.link_address("addr_x", b1).unwrap();
        writer.link_address("addr_y", b2).unwrap();

        writer
            .insert_transaction(&TxRow {
                tx_hash: "aaaa".to_string(),
                slot: 100,
                batcher_id: Some(b2),
                ada_profit: 3,
                network_fee: 0,
                equivalent_ada: 0,
                net_assets: Default::default(),
                order_ids: vec![],
            })
            .unwrap();

        writer.merge_batchers(b1, b2).unwrap();
        writer.commit().unwrap();

        assert_eq!(store.batcher_for_address("addr_y").unwrap(), Some(b1));

        let summaries = store.batcher_summaries().unwrap();
        assert_eq!(summaries.len(), 1);

        let (id, addresses, count) = &summaries[0];
        assert_eq!(*id, b1);
        assert_eq!(addresses.len(), 2);
        assert_eq!(*count, 1);

        let txs = store.batcher_transactions(b1).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].batcher_id, Some(b1));
    }
}
