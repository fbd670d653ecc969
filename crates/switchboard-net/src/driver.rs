use std::rc::Rc;

use crate::callbacks::Callbacks;
use crate::error::TransportError;
use crate::handle::Handle;

/// A transport implementation pluggable into a [`crate::Facade`] under a
/// URL scheme prefix.
///
/// A `Driver` owns its own reactor state (sockets, staging caches, whatever
/// else it needs) and is driven exclusively through `update`; nothing here
/// assumes threads or interior mutability beyond what the implementation
/// itself introduces.
pub trait Driver {
    /// The scheme this driver answers to, e.g. `"tcp"`.
    fn prefix(&self) -> &'static str;

    /// Called once by the facade right after registration, before any
    /// `bind`/`connect`. Receives the shared callback bundle the facade
    /// was constructed with.
    fn init(&mut self, callbacks: Rc<dyn Callbacks>) -> Result<(), TransportError>;

    /// Installs the driver-index bits this driver must stamp into every
    /// handle it allocates, so handles decode back to the right driver.
    fn set_handle_mask(&mut self, mask: i64);

    fn bind(&mut self, address: &str) -> Result<Handle, TransportError>;

    fn connect(&mut self, address: &str) -> Result<Handle, TransportError>;

    /// Sends a single contiguous payload. The default forwards to
    /// [`Driver::send_vectored`] as a one-element fragment list.
    fn send(&mut self, handle: Handle, data: &[u8]) -> Result<(), TransportError> {
        self.send_vectored(handle, &[data])
    }

    /// Sends `fragments` concatenated into a single framed message.
    fn send_vectored(&mut self, handle: Handle, fragments: &[&[u8]]) -> Result<(), TransportError>;

    /// Tears down `handle` if it names a live listener or connection.
    /// Idempotent and silent: closing an already-closed or unknown handle
    /// is not an error.
    fn close(&mut self, handle: Handle);

    /// Runs one non-blocking pass of the driver's reactor, dispatching
    /// any ready callbacks. Returns the number of I/O readiness events
    /// handled, for callers that want to notice an idle driver.
    fn update(&mut self) -> usize;
}
