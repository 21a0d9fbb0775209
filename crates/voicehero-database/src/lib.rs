//! Database connection and query utilities

pub use sea_orm;
mod connection;

pub use connection::{establish_connection, DbConnection};
