//! The probing loop and its lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, Once};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::PingerConfig;
use crate::observer::{NoopObserver, Observer};
use crate::probe::{ProbeEvent, Prober};
use crate::socket::{Connector, RawSocketConnector};
use crate::stats::{Accumulator, Statistics};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Finished,
}

/// Pings one host at a fixed interval until the count runs out or
/// [`Pinger::finish`] is called.
///
/// `run` blocks the calling thread; `finish` and `statistics` may be called
/// from any other thread, typically through an `Arc<Pinger>`.
pub struct Pinger<C: Connector = RawSocketConnector> {
    prober: Prober<C>,
    count: Option<u64>,
    interval: Duration,
    stats: Accumulator,
    observer: Box<dyn Observer>,
    state: AtomicU8,
    finish_once: Once,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl Pinger<RawSocketConnector> {
    /// Pinger over raw ICMP sockets. The caller is expected to have checked
    /// [`crate::privilege::has_privilege`] first.
    pub fn new(config: PingerConfig) -> Self {
        Self::with_connector(config, RawSocketConnector)
    }
}

impl<C: Connector> Pinger<C> {
    pub fn with_connector(config: PingerConfig, connector: C) -> Self {
        let prober = Prober::new(connector, config.local, config.remote, config.timeout)
            .with_payload(config.payload);

        Self {
            prober,
            count: config.count,
            interval: config.interval,
            stats: Accumulator::new(config.local, config.remote),
            observer: Box::new(NoopObserver),
            state: AtomicU8::new(IDLE),
            finish_once: Once::new(),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// ICMP identifier stamped on every probe.
    pub fn identifier(&self) -> u16 {
        self.prober.identifier()
    }

    pub fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            IDLE => State::Idle,
            RUNNING => State::Running,
            _ => State::Finished,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == FINISHED
    }

    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Runs the probing loop on the current thread and returns the final
    /// statistics. Does nothing if the pinger already ran or was finished.
    pub fn run(&self) -> Statistics {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(state = ?self.state(), "Pinger not idle, skipping run");
            return self.statistics();
        }

        self.observer.on_setup();

        let mut sequence: u16 = 0;
        let mut sent: u64 = 0;

        while !self.is_finished() {
            if self.count.is_some_and(|limit| sent >= limit) {
                break;
            }

            self.ping(sequence);
            sent += 1;
            sequence = sequence.wrapping_add(1);

            // No pause after the last probe
            if self.count.is_some_and(|limit| sent >= limit) {
                break;
            }
            self.pause();
        }

        self.finish();
        self.statistics()
    }

    fn ping(&self, sequence: u16) {
        self.stats.record_sent();

        // Once finished, the final statistics have been reported: an in-flight
        // probe may complete but changes nothing.
        let result = self.prober.probe(sequence, &mut |event| {
            if self.is_finished() {
                return;
            }
            match event {
                ProbeEvent::Sent { sequence, bytes } => self.observer.on_send(sequence, bytes),
                ProbeEvent::Stray { sequence } => {
                    if self.stats.record_stray(sequence) {
                        debug!(seq = sequence, "Duplicate echo reply");
                    } else {
                        trace!(seq = sequence, "Late echo reply");
                    }
                }
            }
        });

        if self.is_finished() {
            trace!(seq = sequence, "Discarding probe completed after finish");
            return;
        }

        match result {
            Ok(reply) => {
                self.stats.record(&reply);
                self.observer.on_receive(&reply);
            }
            Err(err) => {
                trace!(seq = sequence, error = %err, "Probe failed");
                self.observer.on_loss(sequence, &err);
            }
        }
    }

    /// Sleeps for the interval, waking early if finished.
    fn pause(&self) {
        let guard = self.wake_lock.lock().unwrap_or_else(|e| e.into_inner());
        let _ = self
            .wake
            .wait_timeout_while(guard, self.interval, |_| !self.is_finished())
            .unwrap_or_else(|e| e.into_inner());
    }

    /// Stops the pinger. Only the first call has any effect: it reports the
    /// final statistics to the observer. A probe already in flight is allowed
    /// to complete, but its outcome is dropped and no new probe is sent.
    pub fn finish(&self) {
        self.finish_once.call_once(|| {
            self.state.store(FINISHED, Ordering::Release);
            {
                let _guard = self.wake_lock.lock().unwrap_or_else(|e| e.into_inner());
                self.wake.notify_all();
            }

            let stats = self.statistics();
            self.observer.on_finish(&stats);
        });
    }
}
