//! # SAF Site CLI
//!
//! Content management for the SAF site's security content catalog:
//! validation profiles and hardening guides, plus the reference data they
//! point at (organizations, standards, technologies, targets, teams, tags).
//!
//! Records live in a record store, either a remote Pocketbase instance or
//! a local SQLite database. Content is added from GitHub repositories:
//! repository metadata is adapted into a candidate record, human-readable
//! reference names are resolved to record ids through lookup maps, and
//! updates write only the fields that actually changed.
//!
//! ## Data flow
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  GitHub  │──▶│ Adapter  │──▶│ Resolver │──▶│   Diff   │
//! │ repo/yml │   │candidate │   │ names→id │   │ changed  │
//! └──────────┘   └──────────┘   └────▲─────┘   └────┬─────┘
//!                                    │              ▼
//!                               ┌────┴─────┐   ┌──────────┐
//!                               │  Lookup  │◀──│  Record  │
//!                               │   maps   │   │  store   │
//!                               └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! saf init                                     # create the SQLite schema
//! saf content add https://github.com/mitre/redhat-enterprise-linux-9-stig-baseline \
//!     --type validation --vendor MITRE --target "Red Hat Enterprise Linux 9"
//! saf content list --type validation
//! saf db validate
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`store`] | Record store trait and backends |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |
//! | [`lookup`] | Name → id lookup maps |
//! | [`github`] | GitHub repository source |
//! | [`adapter`] | Repository data → candidate record |
//! | [`resolve`] | Foreign-key resolution |
//! | [`diff`] | Field-level diff and minimal patches |
//! | [`validation`] | Field and slug validation |
//! | [`content`] | `saf content` commands |
//! | [`table`] | `saf table` commands |
//! | [`db_cmd`] | `saf db` commands |
//! | [`output`] | Output formats and diagnostics |

pub mod adapter;
pub mod config;
pub mod content;
pub mod db;
pub mod db_cmd;
pub mod diff;
pub mod github;
pub mod lookup;
pub mod migrate;
pub mod models;
pub mod output;
pub mod resolve;
pub mod store;
pub mod table;
pub mod validation;
