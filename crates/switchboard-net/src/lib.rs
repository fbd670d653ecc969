//! A non-blocking, handle-oriented network transport: a scheme-multiplexed
//! [`Facade`] dispatches `bind`/`connect`/`send`/`close` to pluggable
//! [`Driver`] implementations, each running its own single-threaded
//! reactor. The built-in [`tcp::StreamDriver`] speaks a length-prefixed
//! framing over TCP.

mod callbacks;
mod driver;
mod error;
mod facade;
mod handle;
pub mod tcp;

pub use callbacks::{Callbacks, MsgExternInfo};
pub use driver::Driver;
pub use error::{TransportError, ERROR_CODE_BASE};
pub use facade::Facade;
pub use handle::{Handle, MAX_DRIVER_NUM};
