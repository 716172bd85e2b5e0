//! salesdash: revenue, refund and return-rate reports for e-commerce transaction CSVs.
//!
//! The query core lives in `salesdash-lib`; this crate re-exports it for the binary and
//! the integration tests.

pub use salesdash_lib::*;
