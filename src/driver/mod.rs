//! Storage drivers implementing the [`Executor`](crate::engine::Executor) capability.

#[cfg(feature = "rusqlite")]
pub mod rusqlite;

#[cfg(feature = "rusqlite")]
pub use self::rusqlite::RusqliteExecutor;
