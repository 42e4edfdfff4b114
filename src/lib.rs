//! TemporaDB - Embedded temporal key-value store
//!
//! Every commit is stamped with a timestamp and never overwrites history:
//! any key can be read as of any past instant, together with the period
//! during which that value held. Branches fork the timeline at a point in
//! time, and secondary indices answer "which keys had this value then?".
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use temporadb::{CommitBatch, EngineConfig, IndexQuery, SearchSpec, TemporalDatabase, Utf8Indexer};
//!
//! let db = TemporalDatabase::open(EngineConfig::default())?;
//! db.create_index("color", Arc::new(Utf8Indexer))?;
//!
//! db.commit_at("master", 10, &CommitBatch::new().put("cars", "golf", "blue"))?;
//! db.create_branch("respray", None)?;
//! db.commit_at("respray", 20, &CommitBatch::new().put("cars", "golf", "red"))?;
//!
//! let on_master = db.get("master", 25, "cars", "golf")?;
//! assert_eq!(on_master.value(), Some(&b"blue".to_vec()));
//!
//! let red = IndexQuery::matching(SearchSpec::equals("color", "red"));
//! assert!(db.query_index("respray", 25, "cars", &red)?.contains("golf"));
//! assert!(db.query_index("respray", 15, "cars", &red)?.is_empty());
//! # Ok::<(), temporadb::TemporaError>(())
//! ```
//!
//! # Architecture
//!
//! - `tempora-core`: periods, temporal key codecs, errors
//! - `tempora-storage`: ordered maps and the per-keyspace data matrix
//! - `tempora-index`: time-aware index documents and queries
//! - `tempora-engine`: branches, chunks and the [`TemporalDatabase`]

pub use tempora_engine::*;
