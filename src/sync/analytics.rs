//! Value-flow attribution for a batch transaction: who ran it, what it
//! netted in ADA, and what tokens it accumulated. Also the online merge of
//! batcher identities observed co-spending in one transaction.

use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::cardano::address;
use crate::prelude::*;
use crate::store::BlockWriter;
use crate::sync::contracts;
use crate::sync::oracle::PriceOracle;

pub struct Analytics {
    pub batcher_id: Option<BatcherId>,
    pub ada_profit: i64,
    pub equivalent_ada: i64,
    pub net_assets: BTreeMap<String, i64>,
}

pub async fn calculate(
    writer: &BlockWriter,
    oracle: &mut PriceOracle,
    inputs: &[(String, UtxoRow)],
    outputs: &[(String, UtxoRow)],
    orders: &[(String, OrderRow)],
) -> Result<Analytics, Error> {
    let mut senders = HashSet::new();
    let mut recipients = HashSet::new();

    for (_, order) in orders.iter() {
        senders.insert(address::wallet_bech32_concat(&order.sender)?);
        recipients.insert(address::wallet_bech32_concat(&order.recipient)?);
    }

    // remaining input owners are the candidate batcher addresses
    let mut in_value = TokenValue::default();
    let mut candidates: Vec<String> = vec![];

    for (_, utxo) in inputs.iter() {
        if senders.contains(&utxo.owner) || contracts::is_pool_script(&utxo.owner) {
            continue;
        }

        if !candidates.contains(&utxo.owner) {
            candidates.push(utxo.owner.clone());
        }

        in_value.merge(&utxo.value);
    }

    let mut out_value = TokenValue::default();

    for (_, utxo) in outputs.iter() {
        if senders.contains(&utxo.owner)
            || recipients.contains(&utxo.owner)
            || contracts::is_profit_address(&utxo.owner)
            || contracts::is_pool_script(&utxo.owner)
        {
            continue;
        }

        out_value.merge(&utxo.value);
    }

    let mut diff = value_diff(&out_value, &in_value);

    let ada_profit = diff.remove(&Token::lovelace()).unwrap_or_default();

    let mut equivalent_ada = 0f64;
    for (token, amount) in diff.iter() {
        match oracle.price_in_ada(token).await {
            Ok(price) => equivalent_ada += *amount as f64 * price,
            Err(error) => warn!(token = %token, %error, "skipping token in ada conversion"),
        }
    }

    let net_assets = diff
        .into_iter()
        .map(|(token, amount)| (token.to_hex(), amount))
        .collect();

    let batcher_id = resolve_batcher(writer, &candidates)?;

    Ok(Analytics {
        batcher_id,
        ada_profit,
        equivalent_ada: equivalent_ada.round() as i64,
        net_assets,
    })
}

/// Resolves the candidate addresses of one batch to a single batcher
/// entity, creating or merging entities as needed. After this call every
/// candidate belongs to exactly one batcher.
fn resolve_batcher(
    writer: &BlockWriter,
    candidates: &[String],
) -> Result<Option<BatcherId>, Error> {
    match candidates {
        // can happen for some cancellations
        [] => Ok(None),

        [address] => match writer.find_batcher(address)? {
            Some(batcher) => Ok(Some(batcher)),
            None => {
                let batcher = writer.create_batcher()?;
                writer.link_address(address, batcher)?;
                Ok(Some(batcher))
            }
        },

        addresses => {
            let mut known: Vec<BatcherId> = vec![];
            let mut unassigned: Vec<&String> = vec![];

            for address in addresses {
                match writer.find_batcher(address)? {
                    Some(batcher) if !known.contains(&batcher) => known.push(batcher),
                    Some(_) => (),
                    None => unassigned.push(address),
                }
            }

            let canonical = match known.first() {
                Some(canonical) => *canonical,
                None => writer.create_batcher()?,
            };

            for other in known.iter().skip(1) {
                writer.merge_batchers(canonical, *other)?;
            }

            for address in unassigned {
                writer.link_address(address, canonical)?;
            }

            Ok(Some(canonical))
        }
    }
}
