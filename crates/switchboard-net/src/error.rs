use thiserror::Error;

/// Base offset applied to [`TransportError::code`], matching the source's
/// `MSG_ERR_BASE`. Application callbacks that want the old numeric contract
/// can recover it from an error without matching on variants.
pub const ERROR_CODE_BASE: i32 = -1000;

/// Everything that can go wrong talking to [`crate::Facade`] or a [`crate::Driver`].
///
/// Variant numbering intentionally leaves the gaps the source's
/// `MessageErrorCode` enum has (-14, -18, -21, -22): those codes named
/// internal states (allocator exhaustion, a second in-flight resolve) that
/// don't exist in this rendition, and skipping them keeps `code()` a useful
/// cross-reference for anyone porting callback logic from the source.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("scheme prefix did not match any registered driver")]
    UninstallDriver,
    #[error("address or handle argument was malformed")]
    InvalidParam,
    #[error("bind() failed at the socket layer")]
    BindFailed,
    #[error("connect() failed at the socket layer")]
    ConnectFailed,
    #[error("address does not resolve to anything reachable")]
    AddressNotExist,
    #[error("send() failed at the socket layer")]
    SendFailed,
    #[error("recv() failed at the socket layer")]
    RecvFailed,
    #[error("received bytes did not form a well-formed frame")]
    ReceiveInvalidData,
    #[error("caller's receive buffer was too small for the staged bytes")]
    ReceiveBufferTooSmall,
    #[error("receive produced no bytes")]
    ReceiveEmpty,
    #[error("reactor failed to initialize")]
    ReactorInitFailed,
    #[error("reactor failed to retrieve the next batch of events")]
    ReactorGetEventFailed,
    #[error("reactor reported an error event for a registered handle")]
    ReactorErrorEvent,
    #[error("send-side payload exceeds the staging cache's per-entry bound")]
    SendBufferTooSmall,
    #[error("handle does not name a tracked connection")]
    UnknownConnection,
    #[error("handle does not name a live listener or connection")]
    InvalidHandle,
    #[error("a driver is already registered for this scheme or slot")]
    DriverAlreadyRegistered,
    #[error("staging cache rejected the bytes")]
    CacheFailed(#[from] switchboard_cache::CacheError),
    #[error("operation is not supported by this driver")]
    Unsupported,
    #[error("unclassified system-level failure")]
    SystemError,
}

impl TransportError {
    /// Recovers the source's negative numeric error code for this variant.
    pub fn code(self) -> i32 {
        let offset = match self {
            TransportError::UninstallDriver => 1,
            TransportError::InvalidParam => 2,
            TransportError::BindFailed => 3,
            TransportError::ConnectFailed => 4,
            TransportError::SendFailed => 5,
            TransportError::RecvFailed => 6,
            TransportError::InvalidHandle => 7,
            TransportError::ReactorInitFailed => 8,
            TransportError::DriverAlreadyRegistered => 9,
            TransportError::CacheFailed(_) => 10,
            TransportError::SystemError => 11,
            TransportError::AddressNotExist => 12,
            TransportError::ReceiveInvalidData => 13,
            TransportError::ReceiveBufferTooSmall => 15,
            TransportError::ReceiveEmpty => 16,
            TransportError::ReactorGetEventFailed => 17,
            TransportError::ReactorErrorEvent => 19,
            TransportError::SendBufferTooSmall => 20,
            TransportError::UnknownConnection => 23,
            TransportError::Unsupported => 24,
        };
        ERROR_CODE_BASE - offset
    }
}
