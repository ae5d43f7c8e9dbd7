//! Streaming viewport engine for charting arbitrarily large CSV time series.
//!
//! The engine indexes a CSV file once, then answers bounded-memory viewport queries:
//! `(x_start, x_end) -> up to N points per numeric column`, against files of any size,
//! including files still being appended to. See `DESIGN.md` for the module-by-module grounding.

pub mod assembler;
pub mod axis;
pub mod coordinator;
pub mod downsample;
pub mod engine;
pub mod error;
pub mod filter;
pub mod follower;
pub mod index;
pub mod options;
pub mod reader;
pub mod schema;
pub mod viewport;

pub use axis::{AxisKind, AxisValue};
pub use engine::{Engine, Handle, SchemaInfo};
pub use error::{Error, Result};
pub use options::EngineOptions;
pub use schema::QualityIssue;
pub use viewport::{DiscardReason, FetchOutcome, RequestToken, Trace};
