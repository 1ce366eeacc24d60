//! A bare MLLP receiver for local testing: logs every inbound frame and
//! answers it with a framed acknowledgement.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::codec::MllpCodec;

/// `<ACK>` ascii char, the simplest possible acknowledgement.
pub const ACK_BYTE: &[u8] = b"\x06";

pub struct Listener {
    listener: TcpListener,
    ack: Bytes,
}

impl Listener {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Listener {
            listener,
            ack: Bytes::from_static(ACK_BYTE),
        })
    }

    /// Replaces the reply sent for every message. It is framed on the way out.
    pub fn with_ack(mut self, ack: impl Into<Bytes>) -> Self {
        self.ack = ack.into();
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until accepting fails, one task per connection.
    pub async fn run(self) -> io::Result<()> {
        info!("Listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let ack = self.ack.clone();

            tokio::spawn(async move {
                debug!("Connection opened from {}", peer);
                if let Err(e) = process(stream, ack).await {
                    warn!("Failed to process connection from {}; error = {}", peer, e);
                }
            });
        }
    }

    /// Accepts a single connection and handles it to completion, returning
    /// the messages it carried.
    pub async fn serve_one(&self) -> io::Result<Vec<BytesMut>> {
        let (stream, _) = self.listener.accept().await?;
        process(stream, self.ack.clone()).await
    }
}

async fn process(stream: TcpStream, ack: Bytes) -> io::Result<Vec<BytesMut>> {
    let mut transport = Framed::new(stream, MllpCodec::new());
    let mut received = Vec::new();

    while let Some(result) = transport.next().await {
        let message = result?;
        info!("Got message: {}", String::from_utf8_lossy(&message).escape_debug());
        // the codec wraps the ack in the MLLP header/footer for us
        transport.send(ack.clone()).await?;
        received.push(message);
    }
    debug!("Connection closed after {} message(s)", received.len());
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn acknowledges_each_frame() {
        let listener = Listener::bind("127.0.0.1:0").await.expect("bind").with_ack(&b"MSA|AA|1"[..]);
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move { listener.serve_one().await });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client.write_all(b"\x0BMSH|^~\\&|A\x1C\x0D").await.expect("write");
        let mut reply = [0u8; 16];
        let n = client.read(&mut reply).await.expect("read");
        assert_eq!(&reply[..n], b"\x0BMSA|AA|1\x1C\x0D");
        drop(client);

        let received = server.await.expect("join").expect("serve");
        assert_eq!(received.len(), 1);
        assert_eq!(&received[0][..], b"MSH|^~\\&|A");
    }
}
