use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::prelude::*;
use crate::store::Store;

pub mod analytics;
pub mod contracts;
pub mod fallback;
pub mod ogmios;
pub mod oracle;
pub mod parse;
pub mod pull;
pub mod rollback;

/// Capacity of the block queue between the chain client and the parser.
const BLOCK_QUEUE_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ogmios_url: String,
    pub blockfrost_project_id: Option<String>,
}

fn define_gasket_policy(config: &Option<gasket::retries::Policy>) -> gasket::runtime::Policy {
    let default_retries = gasket::retries::Policy {
        max_retries: 20,
        backoff_unit: Duration::from_secs(1),
        backoff_factor: 2,
        max_backoff: Duration::from_secs(60),
        dismissible: false,
    };

    let retries = config.clone().unwrap_or(default_retries);

    gasket::runtime::Policy {
        // be generous with tick timeout to avoid timeout during block awaits
        tick_timeout: std::time::Duration::from_secs(600).into(),
        bootstrap_retry: retries.clone(),
        work_retry: retries.clone(),
        teardown_retry: retries.clone(),
    }
}

/// Assembles the two-stage sync pipeline: pull feeds parse through the
/// bounded block queue.
pub fn pipeline(
    config: &Config,
    store: Store,
    open_orders: HashSet<String>,
    retries: &Option<gasket::retries::Policy>,
) -> Result<Vec<gasket::runtime::Tether>, Error> {
    let mut pull = pull::Stage::new(config.ogmios_url.clone(), store.clone());

    let oracle = oracle::PriceOracle::new(contracts::PRICE_ENDPOINT);

    let fallback = fallback::FallbackClient::new(
        contracts::FALLBACK_ENDPOINT,
        config.blockfrost_project_id.clone(),
    );

    let mut parse = parse::Stage::new(store, oracle, fallback, open_orders);

    let (to_parse, from_pull) = gasket::messaging::tokio::mpsc_channel(BLOCK_QUEUE_SIZE);
    pull.downstream.connect(to_parse);
    parse.upstream.connect(from_pull);

    let policy = define_gasket_policy(retries);

    let pull = gasket::runtime::spawn_stage(pull, policy.clone());
    let parse = gasket::runtime::spawn_stage(parse, policy.clone());

    Ok(vec![pull, parse])
}
