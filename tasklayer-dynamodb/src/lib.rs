//! Amazon DynamoDB key-value driver for tasklayer.
//!
//! This crate implements the `KeyValueDriver` trait over `aws-sdk-dynamodb`.
//! Tables are expected to exist with the layout described in
//! `tasklayer_core::schema`: a string partition key `ID` and the
//! `DataTypeGSI`, `AssignedToGSI`, `ProjectGSI` and `EmailGSI` secondary
//! indexes partitioned by `dataType`.
//!
//! To use this driver, include the `dynamodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tasklayer = { version = "x.y.z", features = ["dynamodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tasklayer::{backend::BackendBuilder, dynamodb::DynamoDbDriver, store::Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = DynamoDbDriver::builder()
//!         .with_profile("default")
//!         .build()
//!         .await?;
//!     let store = Store::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as tasklayer_dynamodb;

pub mod conversions;
pub mod store;

pub use store::{DynamoDbDriver, DynamoDbDriverBuilder};
