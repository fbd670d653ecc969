use crate::handle::Handle;

/// Metadata attached to every delivered message.
#[derive(Debug, Clone, Copy)]
pub struct MsgExternInfo {
    /// The handle the receiving side is operating on (a listener's handle
    /// for an accepted peer, or the connection's own handle for a dial-out).
    pub self_handle: Handle,
    /// The handle identifying the specific peer connection the bytes arrived on.
    pub remote_handle: Handle,
    /// Wall-clock arrival time, milliseconds since the Unix epoch.
    pub arrived_ms: i64,
}

/// Application hooks invoked from inside [`crate::Facade::update`].
///
/// All four methods have a no-op default so a caller only needs to
/// override the ones it cares about. None of these are ever called
/// re-entrantly from within a `Facade` method; they fire only during
/// `update`'s single-threaded event dispatch.
pub trait Callbacks {
    /// A complete frame arrived. `payload` borrows the driver's scratch
    /// buffer and is only valid for the duration of this call.
    fn on_message(&self, _payload: &[u8], _info: &MsgExternInfo) -> i32 {
        0
    }

    /// A listener accepted a new peer. `listener` is the bound handle,
    /// `peer` the handle for the freshly accepted connection.
    fn on_peer_connected(&self, _listener: Handle, _peer: Handle) -> i32 {
        0
    }

    /// A server-side (accepted) connection was torn down by the peer or by
    /// an I/O error. Never fires for client-style connections, which
    /// reconnect instead.
    fn on_peer_closed(&self, _listener: Handle, _peer: Handle) -> i32 {
        0
    }

    /// A listener was torn down by a fatal accept-loop error.
    fn on_closed(&self, _listener: Handle) -> i32 {
        0
    }
}
