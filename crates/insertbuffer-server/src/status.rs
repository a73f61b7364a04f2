//! Plain-text HTTP status endpoint.
//!
//! Runs inside the listener's poll on its own TCP port and serves the
//! counters:
//! - `GET /` returns every counter as `name: value` lines, sorted by name
//! - `GET /<name>` returns the value of one counter
//!
//! One request per connection, no keep-alive.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use tracing::{debug, error, info};

use crate::counters::Counters;

/// Token of the status listening socket.
pub(crate) const STATUS_LISTENER_TOKEN: Token = Token(3);

/// Status connections use tokens from here up, far away from client tokens.
pub(crate) const FIRST_STATUS_TOKEN: usize = usize::MAX / 2;

/// Requests longer than this without a complete request line are rejected.
const MAX_REQUEST_LINE: usize = 1024;

/// Status connections held open at once. The oldest is dropped to make room.
const MAX_STATUS_CONNECTIONS: usize = 64;

struct StatusConnection {
    stream: TcpStream,
    buf: Vec<u8>,
    accepted_at: Instant,
}

/// HTTP endpoint exposing the daemon counters.
pub struct StatusServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    counters: Arc<Counters>,
    connections: HashMap<Token, StatusConnection>,
    next_token: usize,
}

impl StatusServer {
    /// Binds the status listener and registers it with the poll.
    pub fn bind(addr: SocketAddr, registry: &Registry, counters: Arc<Counters>) -> io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        registry.register(&mut listener, STATUS_LISTENER_TOKEN, Interest::READABLE)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "status endpoint listening");

        Ok(Self {
            listener,
            local_addr,
            counters,
            connections: HashMap::new(),
            next_token: FIRST_STATUS_TOKEN,
        })
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True for tokens owned by status connections.
    pub(crate) fn owns(token: Token) -> bool {
        token.0 >= FIRST_STATUS_TOKEN
    }

    /// Accepts all pending status connections.
    pub(crate) fn handle_accept(&mut self, registry: &Registry) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token = self.next_token.wrapping_add(1).max(FIRST_STATUS_TOKEN);

                    if let Err(e) = registry.register(&mut stream, token, Interest::READABLE) {
                        error!(error = %e, "failed to register status connection");
                        continue;
                    }
                    debug!(%addr, "status connection");
                    if self.connections.len() >= MAX_STATUS_CONNECTIONS {
                        self.close_oldest(registry);
                    }
                    self.connections.insert(
                        token,
                        StatusConnection {
                            stream,
                            buf: Vec::with_capacity(256),
                            accepted_at: Instant::now(),
                        },
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "status accept failed");
                    break;
                }
            }
        }
    }

    /// Reads from a status connection and answers once the request line is in.
    pub(crate) fn handle_readable(&mut self, registry: &Registry, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut eof = false;
        let mut chunk = [0u8; 512];
        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => conn.buf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(error = %e, "status read failed");
                    self.close(registry, token);
                    return;
                }
            }
        }

        let complete = conn.buf.contains(&b'\n');
        if !complete && !eof && conn.buf.len() < MAX_REQUEST_LINE {
            return;
        }

        let request = String::from_utf8_lossy(&conn.buf);
        let response = match parse_request_path(&request) {
            Some(path) if complete || eof => dispatch(path, &self.counters),
            _ => http_response(400, "Bad Request\n"),
        };

        if let Err(e) = conn.stream.write_all(response.as_bytes()) {
            debug!(error = %e, "status write failed");
        }
        self.close(registry, token);
    }

    /// Closes every open status connection.
    pub(crate) fn close_all(&mut self, registry: &Registry) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close(registry, token);
        }
    }

    fn close_oldest(&mut self, registry: &Registry) {
        let oldest = self
            .connections
            .iter()
            .min_by_key(|(_, conn)| conn.accepted_at)
            .map(|(&token, _)| token);
        if let Some(token) = oldest {
            debug!(?token, "dropping idle status connection");
            self.close(registry, token);
        }
    }

    fn close(&mut self, registry: &Registry, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = registry.deregister(&mut conn.stream) {
                debug!(error = %e, "failed to deregister status connection");
            }
        }
    }
}

/// Parse the request path from an HTTP request line.
fn parse_request_path(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;

    if method != "GET" || !path.starts_with('/') {
        return None;
    }

    Some(path)
}

fn dispatch(path: &str, counters: &Counters) -> String {
    if path == "/" {
        let body: String = counters
            .snapshot()
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}\n"))
            .collect();
        return http_response(200, &body);
    }

    match counters.get_by_name(&path[1..]) {
        Some(value) => http_response(200, &format!("{value}\n")),
        None => http_response(404, "Not Found\n"),
    }
}

/// Build a minimal HTTP/1.1 response.
fn http_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    };

    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}
