/// In debug builds, panics just like `panic!`.
/// In release builds, logs an error via `tracing::error!` and continues.
///
/// Use this for invariant violations the reactor loop should survive in
/// production (an unknown caller bug shouldn't take a server down) but that
/// should fail loudly while developing.
#[macro_export]
macro_rules! safe_panic {
    ($($arg:tt)*) => (if cfg!(debug_assertions) { panic!($($arg)*); } else { tracing::error!($($arg)*) })
}
