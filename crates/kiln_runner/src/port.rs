//! Free-port probing.

use std::net::{IpAddr, Ipv4Addr, TcpListener};

use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

/// Probes candidate ports by binding a local listener.
///
/// Nothing is reserved: the listener is dropped before returning, so two
/// callers racing for one port resolve it when the loser's server fails to
/// bind and allocation is retried from the next candidate.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: IpAddr,
    range: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PortAllocator {
    pub fn new(range: u16) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            range,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Whether `port` can be bound right now.
    pub fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((self.host, port)).is_ok()
    }

    /// First bindable port in `base..base + range`.
    pub fn allocate(&self, base: u16) -> RunnerResult<u16> {
        self.allocate_from(base, base)
    }

    /// First bindable port at or after `start` within the window of `base`.
    pub fn allocate_from(&self, base: u16, start: u16) -> RunnerResult<u16> {
        let end = u32::from(base) + u32::from(self.range);
        for candidate in u32::from(start.max(base))..end.min(u32::from(u16::MAX) + 1) {
            let port = candidate as u16;
            if self.is_free(port) {
                debug!("Allocated port {}", port);
                return Ok(port);
            }
            debug!("Port {} is in use", port);
        }
        Err(RunnerError::PortsExhausted { base, end })
    }
}
