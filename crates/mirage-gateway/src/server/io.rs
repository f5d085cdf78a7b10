//! Connection IO with enforced read, write and idle deadlines.
//!
//! The listener wraps every accepted stream (before any TLS handshake) so
//! the whole connection lifetime is bounded: a read that stalls mid-request
//! times out after the read deadline, a write the peer never drains times
//! out after the write deadline, and a kept-alive connection with no next
//! request times out after the longer idle deadline. The upgraded WebSocket
//! trace stream rides the same adapter; its 30-second pings keep a healthy
//! client inside every deadline.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

pub struct TimeoutIo<T> {
    inner: T,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    /// True between a completed write and the next inbound byte, i.e. the
    /// keep-alive gap where the longer idle deadline applies.
    idle: bool,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
}

impl<T> TimeoutIo<T> {
    pub fn new(
        inner: T,
        read_timeout: Duration,
        write_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            read_timeout,
            write_timeout,
            idle_timeout,
            idle: false,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{what} timed out"))
}

impl<T: AsyncRead + Unpin> AsyncRead for TimeoutIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_deadline = None;
                if result.is_ok() {
                    this.idle = false;
                }
                Poll::Ready(result)
            }
            Poll::Pending => {
                let limit = if this.idle {
                    this.idle_timeout
                } else {
                    this.read_timeout
                };
                let deadline = this
                    .read_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        this.read_deadline = None;
                        Poll::Ready(Err(timed_out(if this.idle {
                            "idle connection"
                        } else {
                            "read"
                        })))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for TimeoutIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.write_deadline = None;
                if result.is_ok() {
                    this.idle = true;
                }
                Poll::Ready(result)
            }
            Poll::Pending => {
                let deadline = this
                    .write_deadline
                    .get_or_insert_with(|| Box::pin(tokio::time::sleep(this.write_timeout)));
                match deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        this.write_deadline = None;
                        Poll::Ready(Err(timed_out("write")))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const READ: Duration = Duration::from_secs(30);
    const WRITE: Duration = Duration::from_secs(30);
    const IDLE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_read_wait_times_out_at_read_deadline() {
        let (client, server) = tokio::io::duplex(64);
        let _client = client; // keep the pipe open, send nothing
        let mut io = TimeoutIo::new(server, READ, WRITE, IDLE);

        let started = tokio::time::Instant::now();
        let mut buf = [0u8; 16];
        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(started.elapsed(), READ);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_wait_gets_idle_deadline() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut io = TimeoutIo::new(server, READ, WRITE, IDLE);

        // One request/response round trip, then the connection goes quiet
        client.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 16];
        io.read(&mut buf).await.unwrap();
        io.write_all(b"response").await.unwrap();

        let started = tokio::time::Instant::now();
        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(started.elapsed(), IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_arriving_in_time_clears_the_deadline() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut io = TimeoutIo::new(server, READ, WRITE, IDLE);

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            io.read_exact(&mut buf).await.unwrap();
            io
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        client.write_all(b"data").await.unwrap();

        // The read succeeded well before its deadline and the next read
        // gets a fresh timer
        let mut io = reader.await.unwrap();
        let started = tokio::time::Instant::now();
        let mut buf = [0u8; 4];
        let err = io.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(started.elapsed(), READ);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        // Tiny pipe the peer never drains
        let (client, server) = tokio::io::duplex(8);
        let _client = client;
        let mut io = TimeoutIo::new(server, READ, WRITE, IDLE);

        let started = tokio::time::Instant::now();
        let payload = [0u8; 64];
        let err = io.write_all(&payload).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert_eq!(started.elapsed(), WRITE);
    }
}
