//! # Role Search
//!
//! Role-aware semantic search over company documents.
//!
//! The ranking engine lives in the `rolesearch-core` crate. This crate wires
//! it to a SQLite user/role store, a saved index file, a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ corpus     │──▶│ index build  │──▶│ index.json   │
//! │ chunks.json│   │ (core)       │   │              │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ load / reindex
//!                  ┌──────────────┐   ┌──────▼───────┐
//!                  │ SQLite users │──▶│ IndexHandle  │
//!                  │ + roles      │   │ + Searcher   │
//!                  └──────────────┘   └──────┬───────┘
//!                                  ┌─────────┴─────────┐
//!                                  ▼                   ▼
//!                             ┌─────────┐        ┌──────────┐
//!                             │   CLI   │        │   HTTP   │
//!                             └─────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rolesearch init --sample-users
//! rolesearch index build
//! rolesearch search "nghỉ phép" --user user001
//! rolesearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation and seed data |
//! | [`users`] | Users, roles and permission views |
//! | [`index_store`] | Index files and the live index handle |
//! | [`search`] | Search requests shared by CLI and HTTP |
//! | [`chat`] | Chat replies from search results |
//! | [`rate_limit`] | Per-user request limiting |
//! | [`auth`] | API-key check |
//! | [`server`] | HTTP server |

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod index_store;
pub mod migrate;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod users;
