use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::callbacks::Callbacks;
use crate::driver::Driver;
use crate::error::TransportError;
use crate::handle::{Handle, MAX_DRIVER_NUM};
use crate::tcp::StreamDriver;

/// Scheme-multiplexed entry point: owns a fixed-size table of [`Driver`]s
/// keyed by both a URL scheme prefix and a slot index, and dispatches
/// `bind`/`connect`/`send`/`close` to whichever driver a handle or address
/// names.
///
/// This is the owned-struct counterpart of the source's process-wide
/// `Message` singleton: nothing here requires global state, so callers
/// construct as many `Facade`s as they need (typically one per reactor
/// thread).
pub struct Facade {
    callbacks: Rc<dyn Callbacks>,
    drivers: Vec<Option<Box<dyn Driver>>>,
    scheme_to_index: HashMap<&'static str, usize>,
}

impl Facade {
    /// Builds a facade with the built-in `tcp` driver already registered.
    pub fn new(callbacks: Rc<dyn Callbacks>) -> Result<Self, TransportError> {
        let mut facade = Self {
            callbacks,
            drivers: (0..MAX_DRIVER_NUM).map(|_| None).collect(),
            scheme_to_index: HashMap::new(),
        };
        facade.add_driver(Box::new(StreamDriver::new(Default::default())))?;
        Ok(facade)
    }

    /// Registers an additional driver in the first free slot.
    ///
    /// Fails if all [`MAX_DRIVER_NUM`] slots are taken or another driver
    /// already answers to this one's [`Driver::prefix`].
    pub fn add_driver(&mut self, mut driver: Box<dyn Driver>) -> Result<(), TransportError> {
        if self.scheme_to_index.contains_key(driver.prefix()) {
            return Err(TransportError::DriverAlreadyRegistered);
        }
        let Some(slot) = self.drivers.iter().position(Option::is_none) else {
            return Err(TransportError::DriverAlreadyRegistered);
        };
        driver.set_handle_mask((slot as i64) << crate::handle::DRIVER_INDEX_SHIFT);
        driver.init(self.callbacks.clone())?;
        debug!(prefix = driver.prefix(), slot, "driver registered");
        self.scheme_to_index.insert(driver.prefix(), slot);
        self.drivers[slot] = Some(driver);
        Ok(())
    }

    fn scheme_slot(&self, address: &str) -> Result<(usize, &str), TransportError> {
        let (scheme, rest) = address.split_once("://").ok_or(TransportError::UninstallDriver)?;
        let slot = *self.scheme_to_index.get(scheme).ok_or(TransportError::UninstallDriver)?;
        Ok((slot, rest))
    }

    fn driver_for_handle(&mut self, handle: Handle) -> Result<&mut Box<dyn Driver>, TransportError> {
        let slot = handle.driver_index() as usize;
        self.drivers.get_mut(slot).and_then(Option::as_mut).ok_or(TransportError::UninstallDriver)
    }

    pub fn bind(&mut self, address: &str) -> Result<Handle, TransportError> {
        let (slot, rest) = self.scheme_slot(address)?;
        self.drivers[slot].as_mut().ok_or(TransportError::UninstallDriver)?.bind(rest)
    }

    pub fn connect(&mut self, address: &str) -> Result<Handle, TransportError> {
        let (slot, rest) = self.scheme_slot(address)?;
        self.drivers[slot].as_mut().ok_or(TransportError::UninstallDriver)?.connect(rest)
    }

    pub fn send(&mut self, handle: Handle, data: &[u8]) -> Result<(), TransportError> {
        self.driver_for_handle(handle)?.send(handle, data)
    }

    pub fn send_vectored(&mut self, handle: Handle, fragments: &[&[u8]]) -> Result<(), TransportError> {
        self.driver_for_handle(handle)?.send_vectored(handle, fragments)
    }

    /// Idempotent and silent, matching [`Driver::close`].
    pub fn close(&mut self, handle: Handle) {
        if let Ok(driver) = self.driver_for_handle(handle) {
            driver.close(handle);
        }
    }

    /// Runs one non-blocking pass over every registered driver, returning
    /// the total number of events handled across all of them.
    pub fn update(&mut self) -> usize {
        self.drivers.iter_mut().flatten().map(|d| d.update()).sum()
    }
}
