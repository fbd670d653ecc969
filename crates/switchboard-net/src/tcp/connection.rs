use std::net::SocketAddr;

use mio::net::TcpStream as MioTcpStream;

use crate::handle::Handle;

/// A single TCP connection's reactor-visible state.
///
/// Behavior (reading, writing, reconnecting) lives on [`super::driver::StreamDriver`]
/// rather than here: the source's `Connection` holds a back-pointer to its
/// owning driver to reach the shared caches and poller, which in Rust is
/// more naturally an index into the driver's own tables than a raw pointer
/// living inside the struct it points back into.
pub(crate) struct Connection {
    /// `None` while a client-style connection is between a failed dial
    /// attempt and its next retry.
    pub(crate) stream: Option<MioTcpStream>,
    pub(crate) peer_addr: SocketAddr,
    /// For a client-style (dialed) connection, equal to `trans_handle`.
    /// For a server-style (accepted) connection, the listener's handle.
    pub(crate) local_handle: Handle,
    /// This connection's own handle; the reactor `Token` is derived from it.
    pub(crate) trans_handle: Handle,
    /// Whether the write side is currently registered for `WRITABLE`.
    pub(crate) write_armed: bool,
}

impl Connection {
    /// Client-style connections auto-reconnect on error; server-style
    /// (accepted) ones are torn down and reported via `on_peer_closed`.
    pub(crate) fn is_client_style(&self) -> bool {
        self.local_handle == self.trans_handle
    }
}
