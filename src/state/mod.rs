//! Shared game state: the canonical ball snapshot record and the
//! coarse-locked store both transports mutate.

pub mod snapshot;
pub mod store;
