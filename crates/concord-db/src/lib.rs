//! Database layer for the Concord platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table in Concord is created through
//! versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the store is treated as a reliable key-indexed
//!   document repository; WAL allows concurrent readers with a single writer,
//!   which matches the coordinator's access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management; coordinator operations check a connection out for
//!   the duration of one lifecycle sequence.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, ensuring migrations ship with the code that depends on
//!   them.
//!
//! There is deliberately no transaction spanning more than one entity here:
//! a contract mutation uses a savepoint over the contract's own tables, but
//! nothing ties two organisations, or an organisation and a contract, into
//! one atomic unit. That gap is owned by the coordinator protocol.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
