use alloc::boxed::Box;

use dethings::listener::ClientSocket;

use embassy_net::Stack;
use embassy_net::tcp::{Error, TcpSocket};
use embassy_time::{Duration, Timer, with_timeout};

use embedded_io_async::{ErrorType, Read, ReadReady, Write};

use log::{info, warn};

// Socket receive buffer size.
const RX_SIZE: usize = 1024;
// Socket transmit buffer size.
const TX_SIZE: usize = 1024;

// Time spent waiting for a client on each accept poll.
const ACCEPT_WINDOW_MS: u64 = 10;

// Inactivity timeout of a client connection.
const IO_TIMEOUT_S: u64 = 15;

// Time given to the peer to receive the response before the socket is
// aborted.
const LINGER_MS: u64 = 50;

/// A `TCP` socket listening on a port and serving one client at a time.
pub struct TcpClientSocket {
    socket: TcpSocket<'static>,
    port: u16,
    connected: bool,
}

impl TcpClientSocket {
    /// Creates a [`TcpClientSocket`] listening on the given port.
    #[must_use]
    pub fn new(stack: Stack<'static>, port: u16) -> Self {
        let rx_buffer = Box::leak(Box::new([0u8; RX_SIZE]));
        let tx_buffer = Box::leak(Box::new([0u8; TX_SIZE]));

        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(IO_TIMEOUT_S)));

        Self {
            socket,
            port,
            connected: false,
        }
    }
}

impl ErrorType for TcpClientSocket {
    type Error = Error;
}

impl ReadReady for TcpClientSocket {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.socket.read_ready()
    }
}

impl Read for TcpClientSocket {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket.read(buf).await
    }
}

impl Write for TcpClientSocket {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket.write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket.flush().await
    }
}

impl ClientSocket for TcpClientSocket {
    async fn poll_accept(&mut self) -> Result<bool, Self::Error> {
        if self.connected {
            return Ok(true);
        }

        // Listening again on the same port keeps the pending handshake.
        match with_timeout(
            Duration::from_millis(ACCEPT_WINDOW_MS),
            self.socket.accept(self.port),
        )
        .await
        {
            Ok(Ok(())) => {
                info!("Client connected from {:?}", self.socket.remote_endpoint());
                self.connected = true;
                Ok(true)
            }
            Ok(Err(e)) => {
                warn!("Failed to accept a client: {e:?}");
                self.socket.abort();
                Err(Error::ConnectionReset)
            }
            Err(_) => Ok(false),
        }
    }

    async fn close(&mut self) {
        if !self.connected {
            return;
        }

        self.socket.close();
        let _ = self.socket.flush().await;
        Timer::after_millis(LINGER_MS).await;
        self.socket.abort();
        let _ = self.socket.flush().await;

        self.connected = false;
    }
}
