//! The background synthesis thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use terra_geo::{TileDataSource, TileKey};

use crate::mailbox::Mailbox;
use crate::synth::{ShadingTables, SynthesisParams, synthesize};

/// Why a requested key will never reach the mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReleaseReason {
    /// Overwritten in the mailbox before the foreground collected it.
    Superseded,
    /// The source failed or synthesis panicked.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Released {
    pub key: TileKey,
    pub reason: ReleaseReason,
}

/// Everything the worker thread owns.
pub(crate) struct WorkerContext {
    pub source: Arc<dyn TileDataSource>,
    pub params: SynthesisParams,
    pub tables: Arc<ShadingTables>,
    /// Current sun longitude in degrees, stored as `f64` bits.
    pub sun_longitude: Arc<AtomicU64>,
    pub mailbox: Mailbox,
    pub released: Sender<Released>,
}

/// Start the worker. It exits once every request sender is dropped.
pub(crate) fn spawn(
    requests: Receiver<TileKey>,
    ctx: WorkerContext,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("tile-synth".into())
        .spawn(move || run(requests, ctx))
}

fn run(requests: Receiver<TileKey>, ctx: WorkerContext) {
    while let Ok(key) = requests.recv() {
        let sun = f64::from_bits(ctx.sun_longitude.load(Ordering::Relaxed));
        let start = std::time::Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            synthesize(ctx.source.as_ref(), key, &ctx.params, sun, &ctx.tables)
        }));

        let failed = match result {
            Ok(Ok(tile)) => {
                tracing::debug!(
                    ?key,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "Tile synthesised"
                );
                if let Some(stale) = ctx.mailbox.put(tile) {
                    release(&ctx, stale.key, ReleaseReason::Superseded);
                }
                continue;
            }
            Ok(Err(err)) => {
                tracing::warn!(?key, %err, "Tile synthesis failed");
                key
            }
            Err(_) => {
                tracing::warn!(?key, "Tile synthesis panicked");
                key
            }
        };

        release(&ctx, failed, ReleaseReason::Failed);
    }
    tracing::debug!("Tile synthesis worker stopped");
}

/// Tell the foreground to forget `key`. Returns false once the cache is gone.
fn release(ctx: &WorkerContext, key: TileKey, reason: ReleaseReason) -> bool {
    match ctx.released.send(Released { key, reason }) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!(?key, ?reason, "Release dropped, cache no longer listening");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use terra_geo::{RawTile, SourceError};

    /// Panics for column 1, fails for column 2, flat otherwise.
    struct TrickySource;

    impl TileDataSource for TrickySource {
        fn displacement(&self, _lat: f64, _lon: f64, _precision: u8) -> f64 {
            0.5
        }

        fn tile(&self, key: TileKey, size: u32) -> Result<RawTile, SourceError> {
            match key.x {
                1 => panic!("corrupt block"),
                2 => Err(SourceError::Unavailable("offline".into())),
                _ => Ok(RawTile::flat(key, size, 128)),
            }
        }
    }

    fn context(mailbox: Mailbox, released: Sender<Released>) -> WorkerContext {
        WorkerContext {
            source: Arc::new(TrickySource),
            params: SynthesisParams {
                tile_size: 4,
                stale_sun_degrees: 10.0,
                min_radius: 1000.0,
                relief: 100.0,
                sea_level: 0.4,
            },
            tables: Arc::new(ShadingTables::new(0.4)),
            sun_longitude: Arc::new(AtomicU64::new(0f64.to_bits())),
            mailbox,
            released,
        }
    }

    #[test]
    fn test_worker_survives_failures() {
        let (tx, rx) = bounded(4);
        let (released_tx, released_rx) = unbounded();
        let mailbox = Mailbox::new();
        let handle = spawn(rx, context(mailbox.clone(), released_tx)).unwrap();

        tx.send(TileKey::new(1, 0, 8)).unwrap();
        tx.send(TileKey::new(2, 0, 8)).unwrap();
        tx.send(TileKey::new(3, 0, 8)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let released: Vec<Released> = released_rx.try_iter().collect();
        assert_eq!(
            released,
            vec![
                Released {
                    key: TileKey::new(1, 0, 8),
                    reason: ReleaseReason::Failed
                },
                Released {
                    key: TileKey::new(2, 0, 8),
                    reason: ReleaseReason::Failed
                },
            ]
        );
        assert_eq!(mailbox.take().map(|t| t.key), Some(TileKey::new(3, 0, 8)));
    }

    #[test]
    fn test_worker_outlives_released_listener() {
        let (tx, rx) = bounded(4);
        let (released_tx, released_rx) = unbounded();
        let mailbox = Mailbox::new();
        let ctx = context(mailbox.clone(), released_tx);
        drop(released_rx);
        assert!(!release(&ctx, TileKey::new(9, 0, 8), ReleaseReason::Failed));

        let handle = spawn(rx, ctx).unwrap();
        tx.send(TileKey::new(2, 0, 8)).unwrap();
        tx.send(TileKey::new(3, 0, 8)).unwrap();
        drop(tx);
        handle.join().unwrap();
        assert_eq!(mailbox.take().map(|t| t.key), Some(TileKey::new(3, 0, 8)));
    }

    #[test]
    fn test_uncollected_tile_is_superseded() {
        let (tx, rx) = bounded(4);
        let (released_tx, released_rx) = unbounded();
        let mailbox = Mailbox::new();
        let handle = spawn(rx, context(mailbox.clone(), released_tx)).unwrap();

        tx.send(TileKey::new(0, 0, 8)).unwrap();
        tx.send(TileKey::new(4, 0, 8)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let released: Vec<Released> = released_rx.try_iter().collect();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].key, TileKey::new(0, 0, 8));
        assert_eq!(released[0].reason, ReleaseReason::Superseded);
        assert_eq!(mailbox.take().map(|t| t.key), Some(TileKey::new(4, 0, 8)));
    }
}
