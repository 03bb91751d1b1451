use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::model::TxRow;

use super::SharedState;

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct BatcherResponse {
    pub transaction_count: u64,
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatcherStatsResponse {
    pub max_profit: i64,
    pub min_profit: i64,
    pub avg_profit: f64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ExpandedBatcherStatsResponse {
    #[serde(flatten)]
    pub stats: BatcherStatsResponse,
    pub num_transactions: u64,
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub tx_hash: String,
    pub ada_profit: i64,
    pub non_ada_profit: i64,
    pub other_assets: BTreeMap<String, i64>,
}

fn profit_stats(txs: &[TxRow]) -> Option<BatcherStatsResponse> {
    let profits: Vec<i64> = txs.iter().map(|x| x.ada_profit + x.equivalent_ada).collect();

    let total: i64 = profits.iter().sum();
    let max_profit = *profits.iter().max()?;
    let min_profit = *profits.iter().min()?;

    Some(BatcherStatsResponse {
        max_profit,
        min_profit,
        avg_profit: total as f64 / profits.len() as f64,
        total,
    })
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "granola batcher analytics" }))
}

pub async fn batchers(
    State(state): State<SharedState>,
) -> Result<Json<Vec<BatcherResponse>>, StatusCode> {
    let summaries = state
        .store
        .batcher_summaries()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let out = summaries
        .into_iter()
        .map(|(_, addresses, transaction_count)| BatcherResponse {
            transaction_count,
            addresses,
        })
        .collect();

    Ok(Json(out))
}

pub async fn batcher_stats(
    State(state): State<SharedState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<BatcherStatsResponse>, StatusCode> {
    let batcher = state
        .store
        .batcher_for_address(&query.address)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let txs = state
        .store
        .batcher_transactions(batcher)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let stats = profit_stats(&txs).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(stats))
}

pub async fn all_batcher_stats(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ExpandedBatcherStatsResponse>>, StatusCode> {
    let summaries = state
        .store
        .batcher_summaries()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut out = vec![];

    for (batcher, addresses, num_transactions) in summaries {
        let txs = state
            .store
            .batcher_transactions(batcher)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        if let Some(stats) = profit_stats(&txs) {
            out.push(ExpandedBatcherStatsResponse {
                stats,
                num_transactions,
                addresses,
            });
        }
    }

    Ok(Json(out))
}

pub async fn batcher_transactions(
    State(state): State<SharedState>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<Vec<TransactionResponse>>, StatusCode> {
    let batcher = state
        .store
        .batcher_for_address(&query.address)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let txs = state
        .store
        .batcher_transactions(batcher)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let out = txs
        .into_iter()
        .map(|x| TransactionResponse {
            tx_hash: x.tx_hash,
            ada_profit: x.ada_profit,
            non_ada_profit: x.equivalent_ada,
            other_assets: x.net_assets,
        })
        .collect();

    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(ada_profit: i64, equivalent_ada: i64) -> TxRow {
        TxRow {
            tx_hash: "aaaa".to_string(),
            slot: 100,
            batcher_id: Some(1),
            ada_profit,
            network_fee: 0,
            equivalent_ada,
            net_assets: Default::default(),
            order_ids: vec![],
        }
    }

    #[test]
    fn stats_aggregate_combined_profit() {
        let txs = vec![tx(10, 0), tx(-4, 2), tx(0, 6)];

        let stats = profit_stats(&txs).unwrap();
        assert_eq!(stats.max_profit, 10);
        assert_eq!(stats.min_profit, -2);
        assert_eq!(stats.total, 14);
        assert!((stats.avg_profit - 14.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_of_no_transactions_is_none() {
        assert!(profit_stats(&[]).is_none());
    }
}
