use anyhow::{Context, Result};

use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;

use pingrs::{LogObserver, Observer, Pinger, PingerConfig, ProbeError, ProbeResult, Statistics};
use tracing_subscriber::EnvFilter;

mod args;

/// Prints replies and the final summary, and logs through `LogObserver`.
struct Printer {
    dst: IpAddr,
    log: LogObserver,
}

impl Observer for Printer {
    fn on_setup(&self) {
        self.log.on_setup();
    }

    fn on_send(&self, sequence: u16, bytes: usize) {
        self.log.on_send(sequence, bytes);
    }

    fn on_loss(&self, sequence: u16, error: &ProbeError) {
        self.log.on_loss(sequence, error);
        println!("Request timeout for icmp_seq {} ({})", sequence, error);
    }

    fn on_receive(&self, result: &ProbeResult) {
        self.log.on_receive(result);
        println!(
            "{} bytes from {}: icmp_seq={} ttl={} time={:.2} ms",
            result.bytes,
            self.dst,
            result.sequence,
            result.ttl,
            result.rtt.as_secs_f64() * 1000.0
        );
    }

    fn on_finish(&self, stats: &Statistics) {
        self.log.on_finish(stats);
        print_statistics(stats);
    }
}

fn print_statistics(stats: &Statistics) {
    println!("\n--- {} ping statistics ---", stats.remote_addr);
    println!(
        "{} packets transmitted, {} received, {} duplicates, {:.1}% packet loss",
        stats.packets_sent, stats.packets_recv, stats.packets_recv_duplicates, stats.packet_loss
    );

    if stats.packets_recv > 0 {
        let ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0;
        println!(
            "rtt min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            ms(stats.min_rtt),
            ms(stats.avg_rtt),
            ms(stats.max_rtt),
            ms(stats.std_dev_rtt)
        );
    }
}

/// Replies are already printed on stdout, so logs stay quiet unless asked.
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let args = args::parse();
    init_logging(args.verbose);

    // Raw sockets need root/Administrator; fail early with a readable message
    if let Some(reason) = pingrs::privilege::denial_reason() {
        eprintln!("{}", reason);
        return Ok(ExitCode::FAILURE);
    }

    let config = PingerConfig::new(
        &args.local_ip.to_string(),
        &args.ip.to_string(),
        args.timeout,
        args.count,
    )
    .context("Invalid ping configuration")?
    .with_interval(args.interval);

    println!(
        "PING {} with {} bytes of data:",
        config.remote,
        config.payload.len()
    );

    let printer = Printer {
        dst: config.remote,
        log: LogObserver,
    };
    let pinger = Arc::new(Pinger::new(config).with_observer(printer));

    // Ctrl+C stops the loop; the summary is printed by on_finish
    let p = Arc::clone(&pinger);
    ctrlc::set_handler(move || p.finish()).context("Failed to set Ctrl+C handler")?;

    let stats = pinger.run();

    Ok(if stats.packets_recv > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
