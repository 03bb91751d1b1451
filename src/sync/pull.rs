//! The chain client stage: keeps one chain-sync session alive, resolves the
//! intersection on boot (walking the store backwards when the endpoint
//! rejects our tip), and feeds blocks downstream in chain order.

use gasket::framework::*;
use tracing::{info, warn};

use crate::prelude::*;
use crate::store::Store;
use crate::sync::contracts;
use crate::sync::ogmios::{NextBlock, OgmiosSession};
use crate::sync::rollback::RollbackHandler;

pub type DownstreamPort = gasket::messaging::OutputPort<PullEvent>;

/// Number of nextBlock requests kept in flight against the endpoint.
pub const NUM_BLOCKS_TO_QUEUE: usize = 100;

pub enum WorkUnit {
    Reset(Point),
    NextBlock,
}

#[derive(Stage)]
#[stage(name = "pull", unit = "WorkUnit", worker = "Worker")]
pub struct Stage {
    ogmios_url: String,
    store: Store,

    pub downstream: DownstreamPort,

    #[metric]
    block_count: gasket::metrics::Counter,

    #[metric]
    chain_tip: gasket::metrics::Gauge,
}

impl Stage {
    pub fn new(ogmios_url: String, store: Store) -> Self {
        Self {
            ogmios_url,
            store,
            downstream: Default::default(),
            block_count: Default::default(),
            chain_tip: Default::default(),
        }
    }

    async fn flush_block(&mut self, block: Block) -> Result<(), WorkerError> {
        self.chain_tip.set(block.slot as i64);
        self.block_count.inc(1);

        self.downstream
            .send(PullEvent::RollForward(block).into())
            .await
            .or_panic()?;

        Ok(())
    }

    async fn flush_reset(&mut self, point: Point) -> Result<(), WorkerError> {
        self.downstream
            .send(PullEvent::Reset(point).into())
            .await
            .or_panic()?;

        Ok(())
    }
}

pub struct Worker {
    session: OgmiosSession,

    /// Set when bootstrap had to truncate the store; flushed downstream
    /// before any new block.
    pending_reset: Option<Point>,
}

impl Worker {
    /// Negotiates the intersection with the endpoint. When our stored tip is
    /// unknown to the chain we walk backwards one stored block at a time,
    /// truncate at the first point the endpoint accepts, and report it.
    async fn intersect(
        stage: &Stage,
        session: &mut OgmiosSession,
    ) -> Result<Option<Point>, WorkerError> {
        let start = match stage.store.max_slot_block().or_panic()? {
            Some((slot, id)) => Point { slot, id },
            None => contracts::default_start(),
        };

        info!(slot = start.slot, hash = %start.id, "finding intersection");

        match session.find_intersection(&start).await {
            Ok(()) => Ok(None),
            Err(Error::IntersectionNotFound) => {
                warn!(slot = start.slot, "intersection not found, walking back");

                let mut handler = RollbackHandler::new(&stage.store).or_panic()?;

                loop {
                    // an exhausted or over-deep walk is fatal
                    let point = handler.prev_block().or_panic()?;

                    match session.find_intersection(&point).await {
                        Ok(()) => {
                            handler.rollback().or_panic()?;
                            info!(slot = point.slot, "intersection found after rollback");
                            return Ok(Some(point));
                        }
                        Err(Error::IntersectionNotFound) => continue,
                        Err(error) => {
                            let failed: Result<(), Error> = Err(error);
                            failed.or_restart()?;
                        }
                    }
                }
            }
            Err(error) => {
                let failed: Result<(), Error> = Err(error);
                failed.or_restart()?;
                Ok(None)
            }
        }
    }
}

#[async_trait::async_trait(?Send)]
impl gasket::framework::Worker<Stage> for Worker {
    async fn bootstrap(stage: &Stage) -> Result<Self, WorkerError> {
        let mut session = OgmiosSession::connect(&stage.ogmios_url).await.or_retry()?;

        info!(url = %stage.ogmios_url, "connected to chain-sync endpoint");

        let pending_reset = Self::intersect(stage, &mut session).await?;

        // the first response only acknowledges the roll back to the
        // intersection we just negotiated
        session.request_next().await.or_restart()?;
        session.recv_next().await.or_restart()?;

        // keep a window of requests in flight so we never wait on the node
        for _ in 0..NUM_BLOCKS_TO_QUEUE {
            session.request_next().await.or_restart()?;
        }

        Ok(Self {
            session,
            pending_reset,
        })
    }

    async fn schedule(
        &mut self,
        _stage: &mut Stage,
    ) -> Result<WorkSchedule<WorkUnit>, WorkerError> {
        match self.pending_reset.take() {
            Some(point) => Ok(WorkSchedule::Unit(WorkUnit::Reset(point))),
            None => Ok(WorkSchedule::Unit(WorkUnit::NextBlock)),
        }
    }

    async fn execute(&mut self, unit: &WorkUnit, stage: &mut Stage) -> Result<(), WorkerError> {
        match unit {
            WorkUnit::Reset(point) => {
                stage.flush_reset(point.clone()).await?;
            }
            WorkUnit::NextBlock => match self.session.recv_next().await.or_restart()? {
                NextBlock::Forward(block) => {
                    self.session.request_next().await.or_restart()?;
                    stage.flush_block(block).await?;
                }
                NextBlock::Backward(point) => {
                    warn!(?point, "chain rolled backward, restarting sync");

                    // restarting re-runs bootstrap: the intersection is
                    // re-negotiated from the stored tip, which drives the
                    // store rollback before blocks flow again
                    let failed: Result<(), Error> =
                        Err(Error::message("chain-sync rollback"));
                    failed.or_restart()?;
                }
            },
        }

        Ok(())
    }
}
