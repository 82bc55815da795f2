//! Visualizer feed: a cancelable loop republishing analyzer snapshots.
//!
//! While a session is playing, one `VisualizerFeed` runs on its own thread,
//! pulling a snapshot from the bound analyzer every frame and handing it to
//! the `SnapshotHub`. The loop checks its `FeedGuard` at the top of every
//! tick and exits as soon as the session stops playing or moves to another
//! binding. `FeedHandle::stop` joins the thread, so nothing is published
//! after it returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use super::analyzer::{SpectralAnalyzer, SpectralSnapshot};

#[derive(Default)]
struct HubState {
    latest: Option<SpectralSnapshot>,
    subscribers: Vec<Sender<SpectralSnapshot>>,
    published: u64,
}

/// Fan-out point between the feed and rendering surfaces.
#[derive(Clone, Default)]
pub struct SnapshotHub {
    inner: Arc<Mutex<HubState>>,
}

impl SnapshotHub {
    fn state(&self) -> MutexGuard<'_, HubState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> Receiver<SpectralSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.state().subscribers.push(tx);
        rx
    }

    pub fn latest(&self) -> Option<SpectralSnapshot> {
        self.state().latest.clone()
    }

    /// Total number of snapshots published so far.
    pub fn published(&self) -> u64 {
        self.state().published
    }

    pub fn clear(&self) {
        self.state().latest = None;
    }

    fn publish(&self, snapshot: SpectralSnapshot) {
        let mut state = self.state();
        // Subscribers that hung up are dropped here.
        state
            .subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
        state.latest = Some(snapshot);
        state.published += 1;
    }
}

/// Session-owned flags the feed consults before every tick.
#[derive(Clone, Default)]
pub struct FeedGuard {
    live_generation: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
}

impl FeedGuard {
    pub fn set_live_generation(&self, generation: u64) {
        self.live_generation.store(generation, Ordering::SeqCst);
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    /// True while the session plays the binding with `generation`.
    pub fn holds(&self, generation: u64) -> bool {
        self.playing.load(Ordering::SeqCst)
            && self.live_generation.load(Ordering::SeqCst) == generation
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub struct VisualizerFeed {
    analyzer: SpectralAnalyzer,
    guard: FeedGuard,
    hub: SnapshotHub,
}

impl VisualizerFeed {
    pub fn new(analyzer: SpectralAnalyzer, guard: FeedGuard, hub: SnapshotHub) -> Self {
        Self {
            analyzer,
            guard,
            hub,
        }
    }

    /// Run one frame: check the guard, pull a snapshot, publish it.
    pub fn tick(&self) -> Tick {
        if !self.guard.holds(self.analyzer.generation()) {
            return Tick::Stop;
        }
        match self.analyzer.snapshot() {
            Some(snapshot) => {
                self.hub.publish(snapshot);
                Tick::Continue
            }
            None => Tick::Stop,
        }
    }

    /// Spawn the loop, ticking once per `interval` until stopped or the guard fails.
    pub fn start(self, interval: Duration) -> std::io::Result<FeedHandle> {
        let generation = self.analyzer.generation();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(format!("visualizer-feed-{generation}"))
            .spawn(move || {
                loop {
                    if self.tick() == Tick::Stop {
                        break;
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("visualizer feed for binding {generation} exited");
            })?;

        Ok(FeedHandle {
            generation,
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Stops its feed when `stop` is called or the handle is dropped.
pub struct FeedHandle {
    generation: u64,
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!("stopping visualizer feed for binding {}", self.generation);
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
