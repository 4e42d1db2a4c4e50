//! Shared utilities.
//!
//! Lexical path handling, cache tag hashing and test helpers.

pub mod hash;
pub mod path;

#[cfg(test)]
pub mod testutil;
