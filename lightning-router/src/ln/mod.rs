//! Implementations of Lightning type definitions needed by the router.

pub mod msgs;
