//! Unit tests against the public API

pub mod ranking;
