//! Integration tests for the StackQL client.

#[cfg(unix)]
pub mod common;
#[cfg(unix)]
pub mod executor_test;
pub mod server_test;
