//! The block parser stage: consumes blocks in chain order, tracks the utxo
//! graph and the open-order set, and emits attributed batch transactions.

use gasket::framework::*;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{error, info};

use crate::cardano::datum;
use crate::prelude::*;
use crate::store::{BlockWriter, Store};
use crate::sync::analytics;
use crate::sync::contracts::{self, ContractVersion};
use crate::sync::fallback::{FallbackClient, FallbackUtxos};
use crate::sync::oracle::PriceOracle;

pub type UpstreamPort = gasket::messaging::InputPort<PullEvent>;

/// Spent utxos are evicted once per this many blocks.
pub const EVICTION_BLOCK_INTERVAL: u64 = 1000;

/// Spent utxos older than one day of slots are safe to drop.
pub const EVICTION_WINDOW_SLOTS: u64 = 86400;

enum ParsedOutput {
    Utxo(String, UtxoRow),
    Order(String, OrderRow),
}

#[derive(Stage)]
#[stage(name = "parse", unit = "PullEvent", worker = "Worker")]
pub struct Stage {
    store: Store,
    oracle: PriceOracle,
    fallback: FallbackClient,

    /// Ids of orders with no consuming tx yet; a derived cache over the
    /// store, rebuilt on startup and after rollbacks.
    open_orders: HashSet<String>,

    current_slot: BlockSlot,
    blocks_seen: u64,

    pub upstream: UpstreamPort,

    #[metric]
    block_count: gasket::metrics::Counter,

    #[metric]
    order_count: gasket::metrics::Counter,

    #[metric]
    batch_count: gasket::metrics::Counter,
}

impl Stage {
    pub fn new(
        store: Store,
        oracle: PriceOracle,
        fallback: FallbackClient,
        open_orders: HashSet<String>,
    ) -> Self {
        Self {
            store,
            oracle,
            fallback,
            open_orders,
            current_slot: 0,
            blocks_seen: 0,
            upstream: Default::default(),
            block_count: Default::default(),
            order_count: Default::default(),
            batch_count: Default::default(),
        }
    }

    pub async fn process_block(&mut self, block: &Block) -> Result<(), Error> {
        self.current_slot = block.slot;

        let block_time = chrono::DateTime::from_timestamp(slot_timestamp(block.slot) as i64, 0)
            .map(|x| x.naive_utc().to_string())
            .unwrap_or_default();

        info!(
            slot = block.slot,
            time = %block_time,
            txs = block.transactions.len(),
            "processing block"
        );

        let writer = self.store.start_block()?;

        for tx in block.transactions.iter() {
            match self.process_tx(&writer, tx, block).await {
                Ok(()) => (),
                Err(
                    error @ (Error::DecodeError(_)
                    | Error::ParseError(_)
                    | Error::MissingInputs(_)
                    | Error::FallbackUnavailable(_)),
                ) => {
                    error!(tx = %tx.id, %error, "skipping transaction");
                }
                Err(error) => return Err(error),
            }
        }

        writer.commit()?;
        self.block_count.inc(1);

        if self.blocks_seen % EVICTION_BLOCK_INTERVAL == 0 {
            let oldest_slot = self.current_slot.saturating_sub(EVICTION_WINDOW_SLOTS);
            let removed = self.store.remove_spent_before(oldest_slot)?;
            info!(oldest_slot, removed, "removed spent utxos");
        }

        self.blocks_seen += 1;

        Ok(())
    }

    async fn process_tx(&mut self, writer: &BlockWriter, tx: &Tx, block: &Block) -> Result<(), Error> {
        let input_ids = tx
            .inputs
            .iter()
            .map(|x| x.utxo_ref().to_string())
            .collect_vec();

        let mut order_ids: Vec<String> = vec![];
        let mut calculate_analytics = false;

        for id in input_ids.iter() {
            writer.mark_spent(id, self.current_slot)?;

            if self.open_orders.remove(id) {
                calculate_analytics = true;
                order_ids.push(id.clone());
            }
        }

        let mut input_utxos = vec![];
        let mut orders = vec![];

        if calculate_analytics {
            input_utxos = writer.utxos(&input_ids)?;

            // cash utxos plus order utxos should cover every input; anything
            // else predates our window and must come from the fallback api
            if input_utxos.len() + order_ids.len() != input_ids.len() {
                let fetched = self.fallback.transaction_utxos(&tx.id).await?;
                merge_fallback_inputs(
                    &input_ids,
                    &order_ids,
                    &mut input_utxos,
                    fetched,
                    self.current_slot,
                )?;

                if input_utxos.len() + order_ids.len() != input_ids.len() {
                    return Err(Error::MissingInputs(tx.id.clone()));
                }
            }

            orders = writer.orders(&order_ids)?;
        }

        let mut outputs = vec![];

        for (idx, output) in tx.outputs.iter().enumerate() {
            let id = UtxoRef::new(tx.id.clone(), idx as u64).to_string();
            outputs.push(self.parse_output(tx, output, id, block)?);
        }

        for output in outputs.iter() {
            match output {
                ParsedOutput::Order(id, row) => {
                    writer.insert_order(id, row)?;
                    self.open_orders.insert(id.clone());
                    self.order_count.inc(1);
                }
                ParsedOutput::Utxo(id, row) => {
                    writer.upsert_utxo(id, row)?;
                }
            }
        }

        if calculate_analytics {
            let plain_outputs: Vec<(String, UtxoRow)> = outputs
                .into_iter()
                .filter_map(|output| match output {
                    ParsedOutput::Utxo(id, row) => Some((id, row)),
                    ParsedOutput::Order(..) => None,
                })
                .collect();

            let analytics = analytics::calculate(
                writer,
                &mut self.oracle,
                &input_utxos,
                &plain_outputs,
                &orders,
            )
            .await?;

            writer.insert_transaction(&TxRow {
                tx_hash: tx.id.clone(),
                slot: self.current_slot,
                batcher_id: analytics.batcher_id,
                ada_profit: analytics.ada_profit,
                network_fee: tx.network_fee(),
                equivalent_ada: analytics.equivalent_ada,
                net_assets: analytics.net_assets,
                order_ids,
            })?;

            self.batch_count.inc(1);
        }

        Ok(())
    }

    fn parse_output(
        &self,
        tx: &Tx,
        output: &TxOutput,
        id: String,
        block: &Block,
    ) -> Result<ParsedOutput, Error> {
        let version = match contracts::order_book_version(&output.address) {
            Some(version) => version,
            None => {
                // generic utxo, kept in case it turns out to belong to a batcher
                let row = UtxoRow {
                    owner: output.address.clone(),
                    value: TokenValue::from(&output.value),
                    created_slot: self.current_slot,
                    spent_slot: None,
                    block_hash: block.id.clone(),
                };

                return Ok(ParsedOutput::Utxo(id, row));
            }
        };

        if version == ContractVersion::V1 {
            // v1 keeps its order metadata in tx metadata instead of a datum
            return Err(Error::decode("v1 order datum not supported"));
        }

        let datum = match (&output.datum, &output.datum_hash) {
            (Some(inline), _) => datum::from_cbor_hex(inline)?,
            (None, Some(hash)) => match tx.datums.get(hash) {
                Some(cbor) => datum::from_cbor_hex(cbor)?,
                None => return Err(Error::decode(format!("no datum attached to {id}"))),
            },
            (None, None) => return Err(Error::decode(format!("no datum attached to {id}"))),
        };

        let (sender, recipient) = datum::order_wallets(&datum, version.is_liquidity())?;

        let row = OrderRow {
            sender,
            recipient,
            placed_slot: self.current_slot,
            transaction_id: None,
        };

        Ok(ParsedOutput::Order(id, row))
    }

    /// The store was truncated behind our back; rebuild the derived caches.
    pub fn reset(&mut self, point: &Point) -> Result<(), Error> {
        info!(slot = point.slot, "reinitializing open orders after rollback");

        self.open_orders = self.store.open_order_ids()?;
        self.current_slot = point.slot;

        Ok(())
    }
}

/// Folds fallback-provided inputs into the loaded set. Entries that are not
/// actual inputs of the tx, already loaded, or orders are silently
/// discarded; the fallback api is known to return both duplicates and
/// extraneous rows.
fn merge_fallback_inputs(
    input_ids: &[String],
    order_ids: &[String],
    input_utxos: &mut Vec<(String, UtxoRow)>,
    fetched: FallbackUtxos,
    slot: BlockSlot,
) -> Result<(), Error> {
    let mut stored: HashSet<String> = input_utxos.iter().map(|(id, _)| id.clone()).collect();

    for input in fetched.inputs {
        let id = input.utxo_ref().to_string();

        if !input_ids.contains(&id) || order_ids.contains(&id) || stored.contains(&id) {
            continue;
        }

        let row = UtxoRow {
            owner: input.address.clone(),
            value: input.token_value()?,
            created_slot: slot,
            spent_slot: None,
            block_hash: String::new(),
        };

        stored.insert(id.clone());
        input_utxos.push((id, row));
    }

    Ok(())
}

pub struct Worker;

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(_stage: &Stage) -> Result<Self, WorkerError> {
        Ok(Self)
    }

    async fn schedule(
        &mut self,
        stage: &mut Stage,
    ) -> Result<WorkSchedule<PullEvent>, WorkerError> {
        let msg = stage.upstream.recv().await.or_panic()?;

        Ok(WorkSchedule::Unit(msg.payload))
    }

    async fn execute(&mut self, unit: &PullEvent, stage: &mut Stage) -> Result<(), WorkerError> {
        match unit {
            PullEvent::RollForward(block) => stage.process_block(block).await.or_panic()?,
            PullEvent::Reset(point) => stage.reset(point).or_panic()?,
        }

        Ok(())
    }
}
