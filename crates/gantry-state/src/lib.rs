//! gantry-state — embedded state store for Gantry.
//!
//! Backed by [redb](https://docs.rs/redb), persists workload definitions
//! and their rollout instances. Definitions carry a resource version for
//! optimistic concurrency: updates name the version they read, and lose
//! to any concurrent writer.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by `{namespace}/{name}`. The `StateStore` is `Clone` + `Send` +
//! `Sync` (backed by `Arc<Database>`) and implements the orchestrator's
//! `DefinitionStore`/`InstanceStore` contracts.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
