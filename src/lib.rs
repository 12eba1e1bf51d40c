//! # Recall Index
//!
//! Semantic retrieval core for a personal knowledge base.
//!
//! Sources (PDF text, web pages, notes, images) are split into
//! boundary-respecting chunks, each chunk and each source summary gets a
//! fixed-dimension embedding, and a hybrid scorer combines semantic
//! similarity with a caller-supplied keyword score. Embeddings missing after
//! a provider outage are filled in later by the backfill orchestrator.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Source  │──▶│  Segmenter  │──▶│  Embedding   │──▶│  Store   │
//! │  (text)  │   │   (chunk)   │   │  Generator   │   │ SQLite / │
//! └──────────┘   └─────────────┘   └──────┬───────┘   │  memory  │
//!                                         │           └────┬─────┘
//!                                  retry + provider        │
//!                                                          ▼
//!                     ┌──────────┐                 ┌──────────────┐
//!                     │  Hybrid  │◀── rank ────────│   Backfill   │
//!                     │  Scorer  │                 │ Orchestrator │
//!                     └──────────┘                 └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init                                   # create database
//! recall ingest notes.md --content-type note --owner alice
//! recall embed pending                          # fill in missing embeddings
//! recall stats                                  # embedding coverage
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Validation, provider and persistence errors |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text segmentation |
//! | [`vector`] | Vector math |
//! | [`hybrid`] | Hybrid scoring |
//! | [`retry`] | Exponential backoff policy |
//! | [`embedding`] | Embedding providers and generator |
//! | [`store`] | Persistence trait and backends |
//! | [`ingest`] | Segment-and-store pipeline |
//! | [`backfill`] | Backfill orchestrator |
//! | [`search`] | Candidate ranking |
//! | [`stats`] | Embedding coverage |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backfill;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod hybrid;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retry;
pub mod search;
pub mod stats;
pub mod store;
pub mod vector;
