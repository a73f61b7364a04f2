//! Blocking client.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use insertbuffer_wire::{RESPONSE_SIZE, Request, Response, WireError};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Read and write timeout. `None` waits indefinitely, which is what a
    /// caller wants when the daemon is applying backpressure.
    pub io_timeout: Option<Duration>,
}

/// Submits statements to a daemon listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct Client {
    socket_path: PathBuf,
    config: ClientConfig,
}

impl Client {
    /// Creates a client for the daemon at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_config(socket_path, ClientConfig::default())
    }

    /// Creates a client with explicit configuration.
    pub fn with_config(socket_path: impl Into<PathBuf>, config: ClientConfig) -> Self {
        Self {
            socket_path: socket_path.into(),
            config,
        }
    }

    /// Path of the daemon socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Hands one statement to the daemon and waits until it is buffered.
    pub fn submit(
        &self,
        database: impl Into<Bytes>,
        statement: impl Into<Bytes>,
    ) -> ClientResult<()> {
        let request = Request::new(database, statement);
        let frame = request.to_bytes()?;

        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(self.config.io_timeout)?;
        stream.set_write_timeout(self.config.io_timeout)?;

        stream.write_all(&frame)?;
        stream.flush()?;

        let mut buf = [0u8; RESPONSE_SIZE];
        let received = read_up_to(&mut stream, &mut buf)?;
        if received == 0 {
            return Err(ClientError::Rejected);
        }

        let response = Response::decode(&buf[..received])?;
        if !response.is_accepted() {
            return Err(WireError::UnknownResult(response.result).into());
        }

        debug!(bytes = frame.len(), "statement acknowledged");
        Ok(())
    }
}

/// Reads until `buf` is full or the peer closes. Returns the byte count.
fn read_up_to(stream: &mut UnixStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::net::UnixListener;
    use std::thread;

    use tempfile::TempDir;
    use test_case::test_case;

    /// Serves one connection: reads the whole request, then writes `reply`.
    fn serve_once(reply: Vec<u8>) -> (TempDir, PathBuf, thread::JoinHandle<Vec<u8>>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ib.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut header = [0u8; 8];
            stream.read_exact(&mut header).unwrap();
            let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).unwrap();
            stream.write_all(&reply).unwrap();

            let mut request = header.to_vec();
            request.extend_from_slice(&payload);
            request
        });

        (dir, path, server)
    }

    #[test]
    fn submit_sends_request_and_accepts_ack() {
        let (_dir, path, server) = serve_once(Response::accepted().encode().to_vec());

        Client::new(&path).submit("shop", "INSERT 1").unwrap();

        let request = server.join().unwrap();
        assert_eq!(
            request,
            Request::new("shop", "INSERT 1").to_bytes().unwrap().to_vec()
        );
    }

    #[test_case(vec![], "Rejected"; "no reply")]
    #[test_case(vec![1, 0, 0], "Wire(ResponseTooShort(3))"; "short")]
    #[test_case(vec![2, 0, 0, 0], "Wire(UnsupportedVersion(2))"; "short wrong version")]
    #[test_case(vec![1, 0, 0, 0, 0, 0, 0, 0], "Wire(UnknownResult(0))"; "bad result")]
    fn submit_rejects_bad_replies(reply: Vec<u8>, expected: &str) {
        let (_dir, path, server) = serve_once(reply);

        let err = Client::new(&path).submit("shop", "x").unwrap_err();
        server.join().unwrap();
        assert_eq!(format!("{err:?}"), expected);
    }

    #[test]
    fn missing_socket_is_io_error() {
        let dir = TempDir::new().unwrap();
        let client = Client::new(dir.path().join("absent.sock"));
        assert!(matches!(client.submit("shop", "x"), Err(ClientError::Io(_))));
    }
}
