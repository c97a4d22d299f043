//! Query surface of the hosted relational store.
//!
//! Every component talks to the store through [`Store`]: filtered, ordered,
//! optionally windowed selects with foreign-key expansion, and
//! insert/update/delete by filter. Rows travel as JSON objects and are
//! decoded into the domain types at the call site.

mod query;

pub use query::*;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppResult;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid row: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("object storage error: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait Store: Send + Sync + 'static {
    fn select(&self, query: Select) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Insert one row; returns the stored representation.
    fn insert(&self, relation: Relation, row: Value) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Patch every row matching `filters`; returns the updated rows.
    fn update(
        &self,
        relation: Relation,
        filters: Vec<Filter>,
        patch: Value,
    ) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    /// Delete every row matching `filters`; returns the deleted rows.
    fn delete(&self, relation: Relation, filters: Vec<Filter>) -> impl Future<Output = StoreResult<Vec<Value>>> + Send;

    fn fetch<T>(&self, query: Select) -> impl Future<Output = AppResult<Vec<T>>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            let rows = self.select(query).await?;
            decode_rows(rows)
        }
    }

    fn insert_row<T>(&self, relation: Relation, row: &T) -> impl Future<Output = AppResult<Vec<Value>>> + Send
    where
        T: Serialize + Sync,
    {
        async move {
            let value = serde_json::to_value(row)?;
            Ok(self.insert(relation, value).await?)
        }
    }
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

/// Object storage for listing photos and avatars.
pub trait PhotoStore: Send + Sync + 'static {
    /// Store `body` under `key`; returns the public URL.
    fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> impl Future<Output = StoreResult<String>> + Send;
}
