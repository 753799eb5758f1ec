use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::sync::{LazyLock, Mutex, PoisonError};

/// Ports handed out and not yet dropped in this process.
static RESERVED_PORTS: LazyLock<Mutex<HashSet<u16>>> = LazyLock::new(Default::default);

/// Localhost port that was free when reserved.
///
/// The operating system picks the port; the process-wide reservation keeps
/// two live `FreePort`s from ever sharing one. The reservation is dropped
/// together with the value.
#[derive(Debug)]
pub struct FreePort(u16);

impl FreePort {
    /// # Panics
    ///
    /// Panics if no free port could be found.
    pub fn new() -> Self {
        for _ in 0..16 {
            let Ok(listener) = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)) else {
                continue;
            };
            let Ok(addr) = listener.local_addr() else {
                continue;
            };
            let mut reserved = RESERVED_PORTS
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if reserved.insert(addr.port()) {
                return FreePort(addr.port());
            }
        }
        panic!("Unable to find a free port");
    }

    pub fn port(&self) -> u16 {
        self.0
    }

    pub fn as_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.0))
    }
}

impl Drop for FreePort {
    fn drop(&mut self) {
        RESERVED_PORTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

impl Default for FreePort {
    fn default() -> Self {
        FreePort::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_bindable() {
        let port = FreePort::new();
        assert_ne!(port.port(), 0);
        drop(TcpListener::bind(port.as_addr()).unwrap());
    }

    #[test]
    fn test_free_ports_are_distinct() {
        let ports: Vec<_> = (0..8).map(|_| FreePort::new()).collect();
        let unique: HashSet<_> = ports.iter().map(FreePort::port).collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn test_free_port_release() {
        let port = FreePort::new();
        let number = port.port();
        drop(port);
        assert!(!RESERVED_PORTS.lock().unwrap().contains(&number));
    }

    #[test]
    fn test_as_addr_format() {
        let port = FreePort::new();
        assert_eq!(port.as_addr().to_string(), format!("127.0.0.1:{}", port.port()));
    }
}
