mod connection;
mod driver;
mod frame;
mod listener;

pub use driver::{StreamDriver, StreamDriverConfig};
