//! Game server state.
//!
//! The bridge never talks to game servers directly; it reads their live
//! state through [`ServerLookup`].

pub mod registry;

pub use registry::{ServerLookup, ServerRegistry};
