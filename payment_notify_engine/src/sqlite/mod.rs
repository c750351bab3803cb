//! SQLite backend for the payment notification engine.
//!
//! Every store operation the engine relies on for correctness maps onto a single SQL statement: reservations are
//! `INSERT … ON CONFLICT DO NOTHING`, status changes and reclaims are conditional `UPDATE`s. Several server processes
//! can therefore share one database file.
mod errors;
mod sqlite_impl;

pub mod db;
pub use errors::SqliteDatabaseError;
pub use sqlite_impl::SqliteDatabase;
