use clap::Parser;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Sends ICMP Echo Requests and reports latency statistics.
#[derive(Parser, Debug)]
#[command(name = "pingrs", version)]
pub struct PingArgs {
    /// IPv4 address to ping.
    pub ip: Ipv4Addr,

    /// Time to wait for each reply (e.g. 5s, 500ms).
    #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Number of packets to send; negative means until interrupted.
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub count: i64,

    /// Wait between packets.
    #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Source address.
    #[arg(short, long = "local-ip", default_value = "0.0.0.0")]
    pub local_ip: Ipv4Addr,

    /// Log every packet.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Accepts `1.5`, `1.5s` or `250ms`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1e-3)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1.0)
    } else {
        (s, 1.0)
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    Duration::try_from_secs_f64(value * scale).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

pub fn parse() -> PingArgs {
    PingArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = PingArgs::try_parse_from(["pingrs", "1.1.1.1"]).unwrap();
        assert_eq!(args.ip, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(args.timeout, Duration::from_secs(5));
        assert_eq!(args.count, -1);
        assert_eq!(args.interval, Duration::from_secs(1));
        assert_eq!(args.local_ip, Ipv4Addr::UNSPECIFIED);
        assert!(!args.verbose);
    }

    #[test]
    fn test_flags() {
        let args =
            PingArgs::try_parse_from(["pingrs", "-c", "3", "-i", "200ms", "-l", "10.0.0.2", "8.8.8.8"])
                .unwrap();
        assert_eq!(args.count, 3);
        assert_eq!(args.interval, Duration::from_millis(200));
        assert_eq!(args.local_ip, Ipv4Addr::new(10, 0, 0, 2));
    }
}
