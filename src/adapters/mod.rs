//! Adapters: concrete implementations of the repository ports.

pub mod sqlite;
