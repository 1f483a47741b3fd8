#![deny(warnings)]

//! Persistence contract: nested key/value save trees, dirty tracking and a
//! store abstraction for the external save subsystem.
//!
//! Trees are `serde_json` maps so the key names stay stable across formats.
//! Loading is forgiving: entries with unknown resource or item ids are logged
//! and skipped instead of failing the whole load.

pub mod dirty;
pub mod ledgers;
pub mod tree;

pub use dirty::{DirtySet, MemoryStore, SaveStore};
pub use ledgers::{
    load_economy, load_legacy_communal, load_payment_board, load_personal_storage, save_economy,
    save_payment_board, save_personal_storage,
};
pub use tree::{LoadContext, LoadError, SaveTree, TreeExt};
