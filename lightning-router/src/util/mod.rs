//! Some utility modules live here. See individual sub-modules for more info.

#[macro_use]
pub(crate) mod macro_logger;

// These have to come after macro_logger to build
pub mod config;
pub mod events;
pub mod logger;
pub mod persist;
pub mod scid_utils;

#[cfg(any(test, feature = "_test_utils"))]
pub mod test_utils;
