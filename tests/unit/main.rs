//! Unit tests for the pgcluster operator
//!
//! This module contains unit tests for:
//! - Instance observation and execution-target selection
//! - User/database derivation and the idempotent SQL protocol
//! - User secret generation and credential preservation
//! - Volume claim generation and the WAL removal safety check

mod fixtures;
mod postgres;
