//!
//! Utility module for exact amount arithmetic.
//!
//! Re-exports the fixed-point parsing and formatting helpers used by the
//! operation mapper.

/// Fixed-point amount parsing and formatting
pub mod amount;

pub use amount::{format_amount, parse_amount, AMOUNT_DECIMALS};
