//! Lifecycle notifications.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::probe::ProbeResult;
use crate::stats::Statistics;

/// Receives engine events. Every method defaults to doing nothing.
///
/// All callbacks run on the probing thread, except `on_finish`, which runs
/// on whichever thread ends the engine.
pub trait Observer: Send + Sync {
    fn on_setup(&self) {}

    fn on_send(&self, _sequence: u16, _bytes: usize) {}

    fn on_loss(&self, _sequence: u16, _error: &ProbeError) {}

    fn on_receive(&self, _result: &ProbeResult) {}

    fn on_finish(&self, _stats: &Statistics) {}
}

/// Lets the caller keep a handle on an observer it hands to the engine.
impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn on_setup(&self) {
        (**self).on_setup()
    }

    fn on_send(&self, sequence: u16, bytes: usize) {
        (**self).on_send(sequence, bytes)
    }

    fn on_loss(&self, sequence: u16, error: &ProbeError) {
        (**self).on_loss(sequence, error)
    }

    fn on_receive(&self, result: &ProbeResult) {
        (**self).on_receive(result)
    }

    fn on_finish(&self, stats: &Statistics) {
        (**self).on_finish(stats)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_setup(&self) {
        debug!("Pinger started");
    }

    fn on_send(&self, sequence: u16, bytes: usize) {
        debug!(seq = sequence, bytes, "Sent echo request");
    }

    fn on_loss(&self, sequence: u16, error: &ProbeError) {
        if error.is_timeout() {
            info!(seq = sequence, "lost");
        } else {
            warn!(seq = sequence, error = %error, "lost");
        }
    }

    fn on_receive(&self, result: &ProbeResult) {
        info!(
            seq = result.sequence,
            time_ms = result.rtt.as_secs_f64() * 1000.0,
            ttl = result.ttl,
            size = result.bytes,
            "pong"
        );
    }

    fn on_finish(&self, stats: &Statistics) {
        debug!(
            sent = stats.packets_sent,
            recv = stats.packets_recv,
            loss = stats.packet_loss,
            "Pinger finished"
        );
    }
}
