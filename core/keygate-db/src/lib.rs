//! SQLite license store for Keygate.
//!
//! Holds the `licenses` table and implements [`keygate_license::LicenseStore`]
//! on top of it. First activation is a single conditional statement,
//! `UPDATE ... WHERE id = ? AND is_used = 0`, so two requests racing to
//! activate the same code cannot both win.
//!
//! Migrations are explicit: call [`SqliteStore::migrate`] once after opening.

mod error;
mod migrations;
mod store;

pub use error::{StoreError, StoreResult};
pub use migrations::SCHEMA_VERSION;
pub use store::SqliteStore;
