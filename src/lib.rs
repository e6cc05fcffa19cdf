// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Graphkeep persists the document of a browser-based graph editor to a
//! single JSON file, and publishes each change to a git remote.
//!
//! The editor talks to graphkeep over a tiny HTTP API (see [`server`]). Every
//! save replaces the stored document wholesale (see [`store`]), then arms a
//! debounced sync that stages, commits, and pushes the document once the
//! editor has been quiet for a while (see [`sync`]).

pub mod config;
pub mod path;
pub mod server;
pub mod store;
pub mod sync;

pub use config::ServiceConfig;
pub use server::{router, serve, AppState};
pub use store::{GraphDocument, GraphStore};
pub use sync::{SyncRunner, SyncService};
