//! MongoDB document driver for tasklayer.
//!
//! This crate implements the `DocumentDriver` trait over the official MongoDB
//! driver. Multi-entity updates run inside a client session transaction, which
//! requires a replica set or a sharded cluster.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tasklayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tasklayer::{backend::BackendBuilder, mongodb::MongoDbDriver, store::Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbDriver::builder("mongodb://localhost:27017", "tasks")
//!         .build()
//!         .await?;
//!     let store = Store::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as tasklayer_mongodb;

pub mod store;

pub use store::{MongoDbDriver, MongoDbDriverBuilder};
