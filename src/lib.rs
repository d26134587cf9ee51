//! Configuration-overlay engine.
//!
//! Independently authored fragments, each declaring classes, properties and
//! array contributions in a small class-based syntax, are merged into a single
//! queryable configuration tree. Fragments register themselves as modules
//! under a `CfgPatches` class, declare dependencies on other modules, and are
//! folded into the tree in dependency order.
//!
//! The public API is organised into layers:
//!
//! - **[`fragment`]**: tokenize and parse fragment text into class trees
//! - **[`registry`]**: extract module identity, version and dependencies
//! - **[`graph`]**: order modules so every dependency is merged first
//! - **[`merge`]**: fold fragments into the [`merge::GlobalTree`]
//! - **[`session`]**: the state machine driving all of the above
//! - **[`commands`]**: top-level subcommand orchestration (`merge`, `check`, `order`, `query`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod registry;
pub mod render;
pub mod session;
