//! HTTP `CONNECT` tunneling client.
//!
//! Works on top of any byte stream, so tunnels can be nested: a forward proxy
//! first, then a relay reached through it.
//!
//! See related [RFC](https://tools.ietf.org/html/rfc7231#section-4.3.6)

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, ReadBuf};

/// Upper bound on the size of the proxy reply header section.
const MAX_REPLY_SIZE: usize = 8 * 1024;

/// The proxy answered the `CONNECT` request with a non-2xx status.
#[derive(Debug, thiserror::Error)]
#[error("CONNECT request rejected: {status_line}")]
pub struct ConnectRejected {
    pub status: u16,
    pub status_line: String,
}

pin_project! {
    /// A stream tunneled through an HTTP proxy.
    #[derive(Debug)]
    pub struct HttpProxyStream<S> {
        #[pin]
        inner: S,
    }
}

impl<S> HttpProxyStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Asks the proxy at the other end of `stream` to open a tunnel to `host:port`.
    ///
    /// Rejections surface as an [`io::Error`] wrapping [`ConnectRejected`].
    pub async fn connect(mut stream: S, host: &str, port: u16) -> io::Result<Self> {
        let request = encode_request(host, port);
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let reply = read_reply_header(&mut stream).await?;
        check_reply(&reply)?;

        Ok(Self { inner: stream })
    }
}

impl<S: AsyncRead> AsyncRead for HttpProxyStream<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for HttpProxyStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

fn encode_request(host: &str, port: u16) -> String {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\n\r\n")
}

// Reads one byte at a time: whatever follows the header section belongs to the tunnel.
async fn read_reply_header<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut reply = Vec::with_capacity(128);

    loop {
        let byte = match stream.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "proxy closed the connection before replying",
                ));
            }
            Err(e) => return Err(e),
        };

        reply.push(byte);

        if reply.ends_with(b"\r\n\r\n") {
            return Ok(reply);
        }

        if reply.len() >= MAX_REPLY_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "proxy reply header is too large"));
        }
    }
}

fn check_reply(reply: &[u8]) -> io::Result<()> {
    let reply = std::str::from_utf8(reply).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let status_line = reply
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty reply"))?;

    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not an HTTP/1.x reply"));
    }

    let status: u16 = parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid status"))?;

    // Any 2xx (successful) response indicates that the proxy switched to tunnel
    // mode right after the blank line ending the header section.
    if !(200..300).contains(&status) {
        return Err(io::Error::other(ConnectRejected {
            status,
            status_line: status_line.to_owned(),
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use rstest::rstest;
    use tokio::io::{AsyncBufReadExt as _, BufReader, duplex};

    use super::*;

    #[rstest]
    #[case("notary.example", 4242, "CONNECT notary.example:4242 HTTP/1.1\r\nHost: notary.example:4242\r\n")]
    #[case("192.168.0.39", 80, "CONNECT 192.168.0.39:80 HTTP/1.1\r\nHost: 192.168.0.39:80\r\n")]
    #[case("2001:db8::1", 443, "CONNECT [2001:db8::1]:443 HTTP/1.1\r\nHost: [2001:db8::1]:443\r\n")]
    fn request_encoding(#[case] host: &str, #[case] port: u16, #[case] expected_prefix: &str) {
        let request = encode_request(host, port);
        assert!(request.starts_with(expected_prefix), "{request}");
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[rstest]
    #[case("HTTP/1.1 200 Connection established\r\n\r\n")]
    #[case("HTTP/1.0 200 OK\r\nProxy-Agent: test\r\n\r\n")]
    fn accepted(#[case] reply: &str) {
        check_reply(reply.as_bytes()).unwrap();
    }

    #[test]
    fn rejected_status_is_exposed() {
        let error = check_reply(b"HTTP/1.1 403 Forbidden\r\n\r\n").unwrap_err();
        let rejected = error.get_ref().unwrap().downcast_ref::<ConnectRejected>().unwrap();
        assert_eq!(rejected.status, 403);
        assert_eq!(rejected.status_line, "HTTP/1.1 403 Forbidden");
    }

    #[rstest]
    #[case("SSH-2.0-OpenSSH\r\n\r\n")]
    #[case("HTTP/1.1 abc\r\n\r\n")]
    #[case("\r\n\r\n")]
    fn garbage_reply(#[case] reply: &str) {
        let error = check_reply(reply.as_bytes()).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn tunneled_bytes_are_not_swallowed() {
        let (client, server) = duplex(1024);

        let proxy = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert_eq!(line, "CONNECT relay.example:4242 HTTP/1.1\r\n");
            loop {
                line.clear();
                server.read_line(&mut line).await.unwrap();
                if line == "\r\n" {
                    break;
                }
            }
            server
                .get_mut()
                .write_all(b"HTTP/1.1 200 OK\r\n\r\nhello")
                .await
                .unwrap();
        });

        let mut stream = HttpProxyStream::connect(client, "relay.example", 4242).await.unwrap();

        let mut payload = [0; 5];
        stream.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"hello");

        proxy.await.unwrap();
    }

    #[tokio::test]
    async fn proxy_hanging_up_is_an_error() {
        let (client, server) = duplex(1024);
        drop(server);

        let error = HttpProxyStream::connect(client, "relay.example", 4242).await.unwrap_err();
        assert!(matches!(
            error.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
        ));
    }

    #[tokio::test]
    async fn oversized_reply_is_an_error() {
        let (client, mut server) = duplex(MAX_REPLY_SIZE * 2);

        let proxy = tokio::spawn(async move {
            let mut request = vec![0; 512];
            let _ = server.read(&mut request).await.unwrap();
            let _ = server.write_all(&vec![b'a'; MAX_REPLY_SIZE + 1]).await;
            server
        });

        let error = HttpProxyStream::connect(client, "relay.example", 4242).await.unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);

        drop(proxy.await.unwrap());
    }
}
