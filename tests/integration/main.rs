//! Integration tests for updown-rounds

mod common;
mod config_test;
mod lifecycle_test;
mod properties_test;
mod sqlite_test;
