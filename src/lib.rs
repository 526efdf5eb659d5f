//! # inboxdb
//!
//! A local-first mail archive index.
//!
//! inboxdb keeps a SQLite store of messages and a contentless FTS5 index over
//! them, and keeps the two in sync with a resumable, interruptible reindex.
//! Searches go through a small query language compiled into a safe full-text
//! expression plus structured column filters.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────────────────┐
//! │  envelopes │──▶│  ingest   │──▶│ documents            │
//! │  (JSON)    │   │ (hashes)  │   │  content_hash ≠      │
//! └─────┬──────┘   └───────────┘   │  indexed_hash        │
//!       │                          └──────────┬───────────┘
//!       │          ┌───────────┐              │
//!       └─────────▶│  reindex  │◀─────────────┘
//!                  │ (session) │──▶ documents_fts + fts_entries
//!                  └───────────┘
//!                                         ▲
//!   "from:a@x.com invoice" ──▶ query ──▶ search
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! inboxdb init
//! inboxdb ingest --index
//! inboxdb search 'from:alice@example.com "quarterly report" -draft'
//! inboxdb db-check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Query and search error types |
//! | [`query`] | Query lexer, validator and translator |
//! | [`search`] | Search façade |
//! | [`store`] | Document upsert and derived columns |
//! | [`fts`] | Full-text entry ledger |
//! | [`reindex`] | Index reconciler and write session |
//! | [`check`] | Consistency audit (`db-check`) |
//! | [`source`] | Document sources |
//! | [`ingest`] | Envelope ingestion |
//! | [`lock`] | Single-writer lock |
//! | [`progress`] | Reindex progress reporting |
//! | [`stats`] | Database statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod check;
pub mod config;
pub mod db;
pub mod error;
pub mod fts;
pub mod ingest;
pub mod lock;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod reindex;
pub mod search;
pub mod source;
pub mod stats;
pub mod store;
