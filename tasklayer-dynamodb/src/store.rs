use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::{
    Client,
    config::Region,
    error::{DisplayErrorContext, SdkError},
    operation::{transact_write_items::TransactWriteItemsError, update_item::UpdateItemError},
    types::{ReturnValue, TransactWriteItem, Update},
};
use std::{collections::HashMap, error::Error as StdError};
use tracing::{debug, warn};

use tasklayer_core::{
    backend::{Backend, BackendBuilder, Item, KeyValueDriver, QueryPage},
    error::{StoreError, StoreResult},
    filter::KeyValueQuery,
    transaction::{DEFAULT_MAX_TRANSACTION_ITEMS, KeyValueWrite, TransactionOutcome},
    update::KeyValueUpdate,
};

use crate::conversions::{from_attribute_map, to_attribute_map, to_expression_values};

/// Cancellation reason code of a transaction item whose condition failed.
const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";

fn backend_error<E: StdError + 'static>(err: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

/// Wraps a possibly empty map for the SDK's `set_*` setters.
fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

/// Key-value driver backed by Amazon DynamoDB.
#[derive(Debug, Clone)]
pub struct DynamoDbDriver {
    client: Client,
}

impl DynamoDbDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn builder() -> DynamoDbDriverBuilder {
        DynamoDbDriverBuilder::default()
    }
}

#[async_trait]
impl KeyValueDriver for DynamoDbDriver {
    async fn put_item(&self, table: &str, item: Item) -> StoreResult<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_attribute_map(&item)?))
            .send()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn get_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)?))
            .send()
            .await
            .map_err(backend_error)?;

        output.item().map(from_attribute_map).transpose()
    }

    async fn update_item(&self, table: &str, key: Item, update: KeyValueUpdate) -> StoreResult<Option<Item>> {
        let result = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)?))
            .update_expression(update.update_expression)
            .set_condition_expression(update.condition_expression)
            .set_expression_attribute_names(non_empty(update.attribute_names))
            .set_expression_attribute_values(non_empty(to_expression_values(&update.attribute_values)?))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(
                output
                    .attributes()
                    .map(from_attribute_map)
                    .transpose()?
                    .unwrap_or_default(),
            )),
            Err(SdkError::ServiceError(err)) if matches!(err.err(), UpdateItemError::ConditionalCheckFailedException(_)) => {
                Ok(None)
            }
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn delete_item(&self, table: &str, key: Item) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(to_attribute_map(&key)?))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(backend_error)?;

        match output.attributes() {
            Some(attributes) if !attributes.is_empty() => Ok(Some(from_attribute_map(attributes)?)),
            _ => Ok(None),
        }
    }

    async fn query_page(
        &self,
        query: &KeyValueQuery,
        limit: i32,
        exclusive_start_key: Option<Item>,
    ) -> StoreResult<QueryPage> {
        let output = self
            .client
            .query()
            .table_name(query.table)
            .index_name(query.index_name)
            .key_condition_expression(&query.key_condition)
            .set_filter_expression(query.filter_expression.clone())
            .set_expression_attribute_names(non_empty(query.attribute_names.clone()))
            .set_expression_attribute_values(non_empty(to_expression_values(&query.attribute_values)?))
            .limit(limit)
            .set_exclusive_start_key(exclusive_start_key.as_ref().map(to_attribute_map).transpose()?)
            .send()
            .await
            .map_err(backend_error)?;

        let items = output
            .items()
            .iter()
            .map(from_attribute_map)
            .collect::<StoreResult<Vec<_>>>()?;
        let last_evaluated_key = output
            .last_evaluated_key()
            .map(from_attribute_map)
            .transpose()?;

        debug!(
            table = query.table,
            index = query.index_name,
            returned = items.len(),
            more = last_evaluated_key.is_some(),
            "queried DynamoDB page"
        );
        Ok(QueryPage { items, last_evaluated_key })
    }

    async fn transact_write(&self, writes: Vec<KeyValueWrite>) -> StoreResult<TransactionOutcome> {
        let items = writes
            .into_iter()
            .map(|write| {
                let update = Update::builder()
                    .table_name(write.table)
                    .set_key(Some(to_attribute_map(&write.key)?))
                    .update_expression(write.update.update_expression)
                    .set_condition_expression(write.update.condition_expression)
                    .set_expression_attribute_names(non_empty(write.update.attribute_names))
                    .set_expression_attribute_values(non_empty(to_expression_values(
                        &write.update.attribute_values,
                    )?))
                    .build()
                    .map_err(|e| StoreError::Backend(e.to_string()))?;

                Ok(TransactWriteItem::builder().update(update).build())
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        let err = match result {
            Ok(_) => return Ok(TransactionOutcome::Committed),
            Err(err) => err,
        };

        if let SdkError::ServiceError(service) = &err {
            if let TransactWriteItemsError::TransactionCanceledException(cancelled) = service.err() {
                let index = cancelled
                    .cancellation_reasons()
                    .iter()
                    .position(|reason| reason.code() == Some(CONDITIONAL_CHECK_FAILED));

                if let Some(index) = index {
                    warn!(index, "DynamoDB transaction cancelled by a failed condition");
                    return Ok(TransactionOutcome::Cancelled { index });
                }
            }
        }

        Err(backend_error(err))
    }
}

/// Builder configuring a [`DynamoDbDriver`] from the AWS environment.
///
/// Unset options fall back to the default AWS configuration chain
/// (environment variables, shared profile files, instance metadata).
#[derive(Debug, Default)]
pub struct DynamoDbDriverBuilder {
    profile: Option<String>,
    region: Option<String>,
    endpoint_url: Option<String>,
    max_transaction_items: Option<usize>,
}

impl DynamoDbDriverBuilder {
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Points the client at a local or alternative endpoint.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_max_transaction_items(mut self, max: usize) -> Self {
        self.max_transaction_items = Some(max);
        self
    }
}

#[async_trait]
impl BackendBuilder for DynamoDbDriverBuilder {
    async fn build(self) -> StoreResult<Backend> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = self.region {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let config = loader.load().await;
        debug!(
            region = ?config.region(),
            endpoint = ?self.endpoint_url,
            "configured DynamoDB driver"
        );

        Ok(Backend::key_value(DynamoDbDriver::new(Client::new(&config)))
            .with_max_transaction_items(self.max_transaction_items.unwrap_or(DEFAULT_MAX_TRANSACTION_ITEMS)))
    }
}
