use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::{InputError, LoginEvent};

const MAX_DATAGRAM: usize = 65_507;

/// Receives one JSON login event per UDP datagram
pub struct DatagramListener {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl DatagramListener {
    /// Create a listener bound to the given address
    pub fn new(address: &str) -> Result<Self, InputError> {
        let socket = UdpSocket::bind(address)?;
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;

        Ok(DatagramListener {
            socket,
            buffer: vec![0; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, InputError> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait up to a second for the next event
    ///
    /// Returns `Ok(None)` on timeout or when the datagram is not a valid
    /// event.
    pub fn read_event(&mut self) -> Result<Option<LoginEvent>, InputError> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((size, addr)) => {
                let message = String::from_utf8_lossy(&self.buffer[..size]);
                match LoginEvent::parse(&message) {
                    Ok(event) => Ok(Some(event)),
                    Err(e) => {
                        log::debug!("Dropping datagram from {}: {}", addr, e);
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                {
                    Ok(None)
                } else {
                    Err(InputError::Io(e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_event() {
        let mut listener = DatagramListener::new("127.0.0.1:0").unwrap();
        let target = listener.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not an event", target).unwrap();
        sender
            .send_to(
                br#"{"user_id":"u1","email":"u1@example.com","success":true,
                     "request":{"headers":{"X-Forwarded-For":"41.202.10.1"}}}"#,
                target,
            )
            .unwrap();

        assert!(listener.read_event().unwrap().is_none());
        let event = listener.read_event().unwrap().unwrap();
        assert_eq!(event.email, "u1@example.com");
        assert_eq!(event.request.header("x-forwarded-for"), Some("41.202.10.1"));
    }
}
