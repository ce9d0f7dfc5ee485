//! Backend selection and connection settings.
//!
//! A [`StoreConfig`] can be deserialized from JSON (or any serde format) or
//! read from `TASKLAYER_*` environment variables:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `TASKLAYER_BACKEND` | `memory`, `memory_key_value`, `mongodb` or `dynamodb` | `memory` |
//! | `TASKLAYER_MONGODB_URI` | MongoDB connection string | `mongodb://localhost:27017` |
//! | `TASKLAYER_MONGODB_DATABASE` | MongoDB database name | `tasklayer` |
//! | `TASKLAYER_AWS_PROFILE` | shared AWS profile | default chain |
//! | `TASKLAYER_AWS_REGION` | AWS region | default chain |
//! | `TASKLAYER_DYNAMODB_ENDPOINT` | alternative DynamoDB endpoint | AWS |
//! | `TASKLAYER_MAX_TRANSACTION_ITEMS` | upper bound on transaction plans | `100` |

use serde::{Deserialize, Serialize};
use tracing::info;

use tasklayer_core::{
    backend::{Backend, BackendBuilder},
    error::{StoreError, StoreResult},
    store::Store,
};
use tasklayer_memory::{InMemoryDocumentStore, InMemoryKeyValueStore};

pub const BACKEND_ENV: &str = "TASKLAYER_BACKEND";
pub const MONGODB_URI_ENV: &str = "TASKLAYER_MONGODB_URI";
pub const MONGODB_DATABASE_ENV: &str = "TASKLAYER_MONGODB_DATABASE";
pub const AWS_PROFILE_ENV: &str = "TASKLAYER_AWS_PROFILE";
pub const AWS_REGION_ENV: &str = "TASKLAYER_AWS_REGION";
pub const DYNAMODB_ENDPOINT_ENV: &str = "TASKLAYER_DYNAMODB_ENDPOINT";
pub const MAX_TRANSACTION_ITEMS_ENV: &str = "TASKLAYER_MAX_TRANSACTION_ITEMS";

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_MONGODB_DATABASE: &str = "tasklayer";

/// Which in-memory driver shape to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryShape {
    #[default]
    Document,
    KeyValue,
}

/// Backend selection with its connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        shape: MemoryShape,
        #[serde(default)]
        max_transaction_items: Option<usize>,
    },
    #[serde(rename = "mongodb")]
    MongoDb {
        uri: String,
        database: String,
        #[serde(default)]
        max_transaction_items: Option<usize>,
    },
    #[serde(rename = "dynamodb")]
    DynamoDb {
        #[serde(default)]
        profile: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint_url: Option<String>,
        #[serde(default)]
        max_transaction_items: Option<usize>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            shape: MemoryShape::default(),
            max_transaction_items: None,
        }
    }
}

impl BackendConfig {
    fn max_transaction_items(&self) -> Option<usize> {
        match self {
            BackendConfig::Memory { max_transaction_items, .. }
            | BackendConfig::MongoDb { max_transaction_items, .. }
            | BackendConfig::DynamoDb { max_transaction_items, .. } => *max_transaction_items,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendConfig,
}

impl StoreConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_transaction_items = lookup(MAX_TRANSACTION_ITEMS_ENV)
            .map(|value| {
                value.trim().parse::<usize>().map_err(|_| {
                    StoreError::Initialization(format!("{MAX_TRANSACTION_ITEMS_ENV} must be a positive integer, got {value:?}"))
                })
            })
            .transpose()?;

        let kind = lookup(BACKEND_ENV).unwrap_or_else(|| "memory".to_string());
        let backend = match kind.trim() {
            "memory" => BackendConfig::Memory {
                shape: MemoryShape::Document,
                max_transaction_items,
            },
            "memory_key_value" => BackendConfig::Memory {
                shape: MemoryShape::KeyValue,
                max_transaction_items,
            },
            "mongodb" => BackendConfig::MongoDb {
                uri: lookup(MONGODB_URI_ENV).unwrap_or_else(|| DEFAULT_MONGODB_URI.to_string()),
                database: lookup(MONGODB_DATABASE_ENV).unwrap_or_else(|| DEFAULT_MONGODB_DATABASE.to_string()),
                max_transaction_items,
            },
            "dynamodb" => BackendConfig::DynamoDb {
                profile: lookup(AWS_PROFILE_ENV),
                region: lookup(AWS_REGION_ENV),
                endpoint_url: lookup(DYNAMODB_ENDPOINT_ENV),
                max_transaction_items,
            },
            other => {
                return Err(StoreError::Initialization(format!(
                    "unknown backend {other:?} in {BACKEND_ENV}"
                )));
            }
        };

        Ok(Self { backend })
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds the backend described by `config`.
///
/// # Errors
///
/// Returns [`StoreError::Initialization`] when the selected backend was not
/// compiled in, or when its driver cannot be set up.
pub async fn build_backend(config: &StoreConfig) -> StoreResult<Backend> {
    let backend = match &config.backend {
        BackendConfig::Memory { shape: MemoryShape::Document, .. } => {
            InMemoryDocumentStore::builder().build().await?
        }
        BackendConfig::Memory { shape: MemoryShape::KeyValue, .. } => {
            InMemoryKeyValueStore::builder().build().await?
        }
        #[cfg(feature = "mongodb")]
        BackendConfig::MongoDb { uri, database, .. } => {
            tasklayer_mongodb::MongoDbDriver::builder(uri, database)
                .build()
                .await?
        }
        #[cfg(not(feature = "mongodb"))]
        BackendConfig::MongoDb { .. } => {
            return Err(StoreError::Initialization(
                "the mongodb backend requires the `mongodb` feature".to_string(),
            ));
        }
        #[cfg(feature = "dynamodb")]
        BackendConfig::DynamoDb { profile, region, endpoint_url, .. } => {
            let mut builder = tasklayer_dynamodb::DynamoDbDriver::builder();
            if let Some(profile) = profile {
                builder = builder.with_profile(profile);
            }
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint_url) = endpoint_url {
                builder = builder.with_endpoint_url(endpoint_url);
            }
            builder.build().await?
        }
        #[cfg(not(feature = "dynamodb"))]
        BackendConfig::DynamoDb { .. } => {
            return Err(StoreError::Initialization(
                "the dynamodb backend requires the `dynamodb` feature".to_string(),
            ));
        }
    };

    let backend = match config.backend.max_transaction_items() {
        Some(max) => backend.with_max_transaction_items(max),
        None => backend,
    };

    info!(
        backend = backend.shape(),
        max_transaction_items = backend.max_transaction_items(),
        "storage backend ready"
    );
    Ok(backend)
}

/// Builds the configured backend and wraps it in a [`Store`].
pub async fn connect(config: &StoreConfig) -> StoreResult<Store> {
    Ok(Store::new(build_backend(config).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();

        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_to_in_memory_documents() {
        assert_eq!(StoreConfig::from_lookup(lookup(&[])).unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_mongodb_from_lookup() {
        let config = StoreConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "mongodb"),
            (MONGODB_DATABASE_ENV, "gotasks"),
        ]))
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::MongoDb {
                uri: DEFAULT_MONGODB_URI.to_string(),
                database: "gotasks".to_string(),
                max_transaction_items: None,
            }
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(BACKEND_ENV, "sqlite")])),
            Err(StoreError::Initialization(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[(MAX_TRANSACTION_ITEMS_ENV, "lots")])),
            Err(StoreError::Initialization(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json(
            r#"{ "backend": { "kind": "dynamodb", "endpoint_url": "http://localhost:8000", "max_transaction_items": 25 } }"#,
        )
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::DynamoDb {
                profile: None,
                region: None,
                endpoint_url: Some("http://localhost:8000".to_string()),
                max_transaction_items: Some(25),
            }
        );
    }

    #[tokio::test]
    async fn test_build_memory_key_value_backend() {
        let config = StoreConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "memory_key_value"),
            (MAX_TRANSACTION_ITEMS_ENV, "3"),
        ]))
        .unwrap();

        let backend = build_backend(&config).await.unwrap();

        assert_eq!(backend.shape(), "key_value");
        assert_eq!(backend.max_transaction_items(), 3);
    }

    #[cfg(not(feature = "mongodb"))]
    #[tokio::test]
    async fn test_disabled_backend_fails_to_build() {
        let config = StoreConfig {
            backend: BackendConfig::MongoDb {
                uri: DEFAULT_MONGODB_URI.to_string(),
                database: DEFAULT_MONGODB_DATABASE.to_string(),
                max_transaction_items: None,
            },
        };

        assert!(matches!(connect(&config).await, Err(StoreError::Initialization(_))));
    }
}
