//! # codesim
//!
//! Index the functions, methods, and constructors of a Python or Java file
//! as embeddings and surface the most similar code already indexed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ source │──▶│ extract  │──▶│ embedding │──▶│  store   │──▶│  report  │
//! │ + lang │   │(t-sitter)│   │  (HTTP)   │   │ (SQLite) │   │  (k-NN)  │
//! └────────┘   └──────────┘   └───────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export VOYAGE_API_KEY=...
//! codesim src/app.py                 # index + neighbors, upsert mode
//! codesim --mode insert Main.java    # reject ids that already exist
//! codesim --dry-run src/app.py       # extract only
//! codesim inspect                    # what is stored
//! codesim search "parse a config file"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`source`] | Reading source bytes |
//! | [`lang`] | Extension → language |
//! | [`extract`] | Tree-sitter declaration extraction |
//! | [`embedding`] | Embedding client trait and HTTP providers |
//! | [`store`] | Persistent vector collection |
//! | [`report`] | Text rendering |
//! | [`pipeline`] | The single-file indexing run |
//! | [`inspect`] | Collection inspection |
//! | [`search`] | Free-text similarity search |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod inspect;
pub mod lang;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod source;
pub mod store;

pub use error::{IndexError, Result};
