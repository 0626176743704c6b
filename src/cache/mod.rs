//! # Response Cache
//!
//! Request keys plus the bounded success and failure stores consulted before a
//! request reaches the scheduler.

pub mod key;
pub mod store;

pub use key::RequestKey;
pub use store::{CacheLookup, CacheSizes, ResponseCache};
