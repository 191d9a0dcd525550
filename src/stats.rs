//! Running packet counts and round-trip statistics.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::probe::ProbeResult;

/// Point-in-time copy of the accumulated statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub packets_recv_duplicates: u64,
    /// Percentage of sent packets without a reply; 0 when nothing was sent.
    pub packet_loss: f64,
    /// Every round-trip time, in arrival order.
    pub rtts: Vec<Duration>,
    pub local_addr: String,
    pub remote_addr: String,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
    /// Population standard deviation.
    pub std_dev_rtt: Duration,
}

#[derive(Debug, Default)]
struct Totals {
    sent: u64,
    recv: u64,
    duplicates: u64,
    rtts: Vec<Duration>,
    answered: HashSet<u16>,
    // Welford state, in nanoseconds
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

/// Thread-safe accumulator: writers are exclusive, snapshots share a read lock.
#[derive(Debug)]
pub struct Accumulator {
    local: IpAddr,
    remote: IpAddr,
    totals: RwLock<Totals>,
}

impl Accumulator {
    pub fn new(local: IpAddr, remote: IpAddr) -> Self {
        Self {
            local,
            remote,
            totals: RwLock::new(Totals::default()),
        }
    }

    // Every update leaves Totals consistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Totals> {
        self.totals.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Totals> {
        self.totals.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_sent(&self) {
        self.write().sent += 1;
    }

    /// Adds a received reply.
    pub fn record(&self, result: &ProbeResult) {
        let mut t = self.write();
        let x = result.rtt.as_nanos() as f64;

        t.recv += 1;
        t.rtts.push(result.rtt);
        t.answered.insert(result.sequence);

        if t.recv == 1 || x < t.min {
            t.min = x;
        }
        if x > t.max {
            t.max = x;
        }

        // Welford's online algorithm
        let n = t.recv as f64;
        let delta = x - t.mean;
        t.mean += delta / n;
        let delta2 = x - t.mean;
        t.m2 += delta * delta2;
    }

    /// Counts a reply for `sequence` that arrived outside its own probe.
    /// Returns true if it duplicated an already answered probe.
    pub fn record_stray(&self, sequence: u16) -> bool {
        let mut t = self.write();
        if t.answered.contains(&sequence) {
            t.duplicates += 1;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> Statistics {
        let t = self.read();

        let packet_loss = if t.sent == 0 {
            0.0
        } else {
            t.sent.saturating_sub(t.recv) as f64 / t.sent as f64 * 100.0
        };

        let std_dev = if t.recv == 0 {
            0.0
        } else {
            (t.m2 / t.recv as f64).sqrt()
        };

        Statistics {
            packets_sent: t.sent,
            packets_recv: t.recv,
            packets_recv_duplicates: t.duplicates,
            packet_loss,
            rtts: t.rtts.clone(),
            local_addr: self.local.to_string(),
            remote_addr: self.remote.to_string(),
            min_rtt: nanos(t.min),
            max_rtt: nanos(t.max),
            avg_rtt: nanos(t.mean),
            std_dev_rtt: nanos(std_dev),
        }
    }
}

fn nanos(x: f64) -> Duration {
    if x.is_finite() && x > 0.0 {
        Duration::from_nanos(x.round() as u64)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn acc() -> Accumulator {
        Accumulator::new("0.0.0.0".parse().unwrap(), "1.1.1.1".parse().unwrap())
    }

    fn reply(sequence: u16, millis: u64) -> ProbeResult {
        ProbeResult {
            sequence,
            rtt: Duration::from_millis(millis),
            ttl: 64,
            bytes: 20,
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let s = acc().snapshot();
        assert_eq!(s.packets_sent, 0);
        assert_eq!(s.packet_loss, 0.0);
        assert!(s.rtts.is_empty());
        assert_eq!(s.min_rtt, Duration::ZERO);
        assert_eq!(s.std_dev_rtt, Duration::ZERO);
        assert_eq!(s.local_addr, "0.0.0.0");
        assert_eq!(s.remote_addr, "1.1.1.1");
    }

    #[test]
    fn test_single_reply() {
        let a = acc();
        a.record_sent();
        a.record(&reply(0, 12));

        let s = a.snapshot();
        assert_eq!(s.packets_recv, 1);
        assert_eq!(s.min_rtt, Duration::from_millis(12));
        assert_eq!(s.max_rtt, Duration::from_millis(12));
        assert_eq!(s.avg_rtt, Duration::from_millis(12));
        assert_eq!(s.std_dev_rtt, Duration::ZERO);
        assert_eq!(s.packet_loss, 0.0);
    }

    #[test]
    fn test_counts_and_order() {
        let a = acc();
        let samples = [30, 10, 20, 50];
        for (seq, ms) in samples.iter().enumerate() {
            a.record_sent();
            a.record(&reply(seq as u16, *ms));
        }
        a.record_sent();
        a.record_sent();

        let s = a.snapshot();
        assert_eq!(s.packets_sent, 6);
        assert_eq!(s.packets_recv, 4);
        let expected: Vec<_> = samples.iter().map(|ms| Duration::from_millis(*ms)).collect();
        assert_eq!(s.rtts, expected);
        assert!((s.packet_loss - 2.0 / 6.0 * 100.0).abs() < 1e-9);
        assert_eq!(s.min_rtt, Duration::from_millis(10));
        assert_eq!(s.max_rtt, Duration::from_millis(50));
        assert_eq!(s.avg_rtt, Duration::from_micros(27_500));
    }

    #[test]
    fn test_stddev_matches_two_pass() {
        let a = acc();
        let samples: Vec<u64> = vec![1, 1000, 3, 77, 77, 250, 12_345, 8, 500];
        for (seq, ms) in samples.iter().enumerate() {
            a.record_sent();
            a.record(&reply(seq as u16, *ms));
        }

        let xs: Vec<f64> = samples.iter().map(|ms| *ms as f64 * 1e6).collect();
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;

        let s = a.snapshot();
        let got = s.std_dev_rtt.as_nanos() as f64;
        assert!((got - var.sqrt()).abs() <= 1.0, "{} vs {}", got, var.sqrt());
        assert!(s.min_rtt <= s.avg_rtt && s.avg_rtt <= s.max_rtt);
    }

    #[test]
    fn test_duplicates() {
        let a = acc();
        a.record_sent();
        a.record(&reply(0, 5));

        assert!(a.record_stray(0));
        assert!(!a.record_stray(1));
        assert_eq!(a.snapshot().packets_recv_duplicates, 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let a = acc();
        a.record_sent();
        a.record(&reply(0, 5));
        let before = a.snapshot();
        a.record_sent();
        a.record(&reply(1, 6));

        assert_eq!(before.rtts.len(), 1);
        assert_eq!(a.snapshot().rtts.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_totals() {
        let a = Arc::new(acc());
        let writer = {
            let a = Arc::clone(&a);
            thread::spawn(move || {
                for seq in 0..2000u16 {
                    a.record_sent();
                    a.record(&reply(seq, 1 + seq as u64 % 7));
                }
            })
        };

        for _ in 0..200 {
            let s = a.snapshot();
            assert!(s.packets_recv <= s.packets_sent);
            assert_eq!(s.rtts.len() as u64, s.packets_recv);
        }
        writer.join().unwrap();
        assert_eq!(a.snapshot().packets_recv, 2000);
    }
}
