use gasket::daemon::Daemon;
use tracing::{info, warn};

use granola::prelude::*;
use granola::store::Store;
use granola::sync::rollback::RollbackHandler;

/// The last block before a shutdown may have been half-processed; always
/// step back one block so it is fetched and applied again.
fn prepare_store(store: &Store) -> Result<(), Error> {
    if store.max_slot_block()?.is_none() {
        return Ok(());
    }

    let mut handler = RollbackHandler::new(store)?;

    match handler.prev_block() {
        Ok(_) => handler.rollback()?,
        Err(_) => warn!("no previous block to roll back to"),
    }

    Ok(())
}

#[tokio::main]
pub async fn run() -> Result<(), Error> {
    let config = crate::common::Config::load()?;

    crate::common::setup_tracing(&config)?;

    let store = crate::common::open_store(&config)?;

    prepare_store(&store)?;

    let open_orders = store.open_order_ids()?;
    info!(count = open_orders.len(), "initialized open orders");

    let exit = crate::common::hook_exit_token();

    let server = tokio::spawn(granola::serve::serve(
        granola::serve::Config {
            listen_address: config.listen_address,
            permissive_cors: Some(true),
        },
        store.clone(),
        exit.clone(),
    ));

    let sync_config = granola::sync::Config {
        ogmios_url: config.ogmios_url(),
        blockfrost_project_id: config.blockfrost_project_id.clone(),
    };

    let tethers = granola::sync::pipeline(&sync_config, store, open_orders, &None)?;

    crate::common::run_pipeline(Daemon::new(tethers), exit).await;

    server.abort();

    Ok(())
}
