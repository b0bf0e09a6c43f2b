pub mod error;
pub mod model;
pub mod validate;
pub mod credential;
pub mod paths;
pub mod atomic;
pub mod registry;
pub mod generator;
pub mod snapshots;
pub mod publisher;
pub mod store;
pub mod config;
pub mod server;

pub use error::{ConfError, ConfResult};
pub use store::{ConfigStore, SharedConfigStore};

// Test-only printing helper: expands to eprintln! during tests and debug builds.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
