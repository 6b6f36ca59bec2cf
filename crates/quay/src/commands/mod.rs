//! CLI command implementations.
//!
//! Thin glue over the library crates: load a manifest, open a workspace,
//! drive the resolver/workspace/build-plan APIs, print results. No command
//! here does anything the library crates don't already do.

mod core;
pub mod ui;

pub use core::{
    clean, compute_checksum, config_get_mirror, config_set_mirror, config_unset_mirror, edit,
    reset, resolve, show_dependencies, unedit, update, DependencyFormat,
};
