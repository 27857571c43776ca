//! Channel bridge between the game-server fleet and Discord.
//!
//! ## Module Structure
//!
//! - `coordinator`: mapping tables, persistence and worker lookup (`Coordinator`)
//! - `state`: in-memory tables and worker pools behind the coordinator lock
//! - `pool`: reference-counted per-channel worker cache
//! - `queue`: batching outbound message queue, one per channel
//! - `updater`: throttled channel name/topic updater, one per server channel
//! - `status`: channel name/topic computation

pub mod coordinator;
pub mod pool;
pub mod queue;
pub mod state;
pub mod status;
pub mod updater;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{Coordinator, CoordinatorSettings};
