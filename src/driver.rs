//! Engine loop with statum lifecycle
//!
//! Owns the [`Mapper`] and feeds it from one queue, so every dispatch and every
//! timer callback happens on the task that awaits [`Driver::run`].
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Running ──► Stopped
//! ```
//!
//! # Architecture
//!
//! ```text
//! DriverHandle ──► mpsc queue ──┐
//!                               ▼
//!          interval tick ──► [Mapper] ──► OutputSink
//! ```
//!
//! Action trees are reference counted without atomics, so the driver is not
//! `Send`. Run it on a current-thread runtime or inside a `LocalSet`.

use crate::config::DriverConfig;
use crate::controller::ControllerState;
use crate::error::DriverError;
use crate::mapper::Mapper;
use crate::profile::Profile;
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Work items accepted by a running driver
#[derive(Debug)]
pub enum DriverMessage {
    /// Fresh controller report
    State(ControllerState),
    /// Replaces the binding table of the mapper
    SwapProfile(Profile),
}

#[state]
#[derive(Debug, Clone)]
pub enum DriverState {
    Idle,    // Mapper built, queue open, loop not started
    Running, // Processing queue and timers
    Stopped, // Loop left, mapper can be taken back
}

#[machine]
pub struct Driver<S: DriverState> {
    mapper: Mapper,
    inbox: mpsc::Receiver<DriverMessage>,
    shutdown: CancellationToken,
    tick_interval: Duration,
    started: Instant,
    processed: u64,
}

impl<S: DriverState> Driver<S> {
    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    /// Snapshots and profile swaps handled so far
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl Driver<Idle> {
    /// Builds a driver around `mapper` and the handle that feeds it
    pub fn create(mapper: Mapper, config: &DriverConfig) -> (Self, DriverHandle) {
        let (sender, inbox) = mpsc::channel(config.input_queue.max(1));
        let shutdown = CancellationToken::new();
        info!(
            "Initializing driver (tick {:?}, queue {})",
            config.tick_interval(),
            config.input_queue
        );
        let driver = Self::new(
            mapper,
            inbox,
            shutdown.clone(),
            config.tick_interval(),
            Instant::now(),
            0,
        );
        (driver, DriverHandle { sender, shutdown })
    }

    /// Starts the engine clock
    pub fn start(mut self) -> Driver<Running> {
        info!("Starting driver");
        self.started = Instant::now();
        self.transition()
    }
}

impl Driver<Running> {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn handle(&mut self, message: DriverMessage) {
        self.processed += 1;
        let now = self.elapsed();
        match message {
            DriverMessage::State(state) => {
                trace!("Snapshot at {:?}", now);
                self.mapper.input(state, now);
            }
            DriverMessage::SwapProfile(profile) => {
                info!("Switching to profile '{}'", profile.name);
                self.mapper.run_scheduled(now);
                self.mapper.set_profile(profile);
            }
        }
    }

    /// Main loop. Returns once the token is cancelled or every handle is gone.
    pub async fn run(mut self) -> Result<Driver<Stopped>, DriverError> {
        info!("Driver loop running");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                message = self.inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => {
                        info!("All driver handles dropped");
                        break;
                    }
                },

                _ = ticker.tick() => {
                    let now = self.elapsed();
                    self.mapper.run_scheduled(now);
                }
            }
        }

        let now = self.elapsed();
        self.mapper.run_scheduled(now);
        debug!("Driver handled {} messages", self.processed);
        Ok(self.transition())
    }
}

impl Driver<Stopped> {
    /// Releases every held key and hands the mapper back
    pub fn into_mapper(mut self) -> Mapper {
        self.mapper.set_profile(Profile::empty());
        info!("Driver stopped");
        self.mapper
    }
}

/// Sending side of a driver
#[derive(Debug, Clone)]
pub struct DriverHandle {
    sender: mpsc::Sender<DriverMessage>,
    shutdown: CancellationToken,
}

impl DriverHandle {
    pub async fn send_state(&self, state: ControllerState) -> Result<(), DriverError> {
        self.sender
            .send(DriverMessage::State(state))
            .await
            .map_err(|e| DriverError::ChannelClosed(format!("state not delivered: {}", e)))
    }

    pub async fn swap_profile(&self, profile: Profile) -> Result<(), DriverError> {
        self.sender
            .send(DriverMessage::SwapProfile(profile))
            .await
            .map_err(|e| DriverError::ChannelClosed(format!("profile not delivered: {}", e)))
    }

    /// Token that stops the loop when cancelled
    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        debug!("Sending shutdown signal to driver");
        self.shutdown.cancel();
    }
}
