//! Simple TCP connect sweep for locating devices that expose a known port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, trace};

/// Configuration for [`scan`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Connect timeout per host.
    pub timeout: Duration,
    /// Number of probing threads.
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30),
            workers: 32,
        }
    }
}

/// The 254 host addresses of the /24 segment containing `ip`.
pub fn subnet_hosts(ip: Ipv4Addr) -> Vec<IpAddr> {
    let [a, b, c, _] = ip.octets();
    (1..=254u8)
        .map(|d| IpAddr::V4(Ipv4Addr::new(a, b, c, d)))
        .collect()
}

/// Probe every host in `hosts` for a listener on `port`.
///
/// Returns the hosts that accepted a connection, in input order.
pub fn scan(hosts: &[IpAddr], port: u16, config: &ScanConfig) -> Vec<IpAddr> {
    let workers = config.workers.clamp(1, hosts.len().max(1));
    let next = AtomicUsize::new(0);
    let found = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(&host) = hosts.get(index) else {
                    break;
                };
                if probe(SocketAddr::new(host, port), config.timeout) {
                    if let Ok(mut found) = found.lock() {
                        found.push(index);
                    }
                }
            });
        }
    });

    let mut found = found.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    found.sort_unstable();
    let responders: Vec<IpAddr> = found.into_iter().map(|index| hosts[index]).collect();
    debug!(
        port,
        probed = hosts.len(),
        responders = responders.len(),
        "scan finished"
    );
    responders
}

fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => {
            trace!(%addr, "port open");
            true
        }
        Err(_) => false,
    }
}
