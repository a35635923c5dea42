// src/storage/rest.rs
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{
    ChangeEvent, ChangeHub, Filter, Order, RemoteStore, StoreError, StoreResult, Table,
};

/// PostgREST error code for "`.single()` matched zero rows".
const NO_ROWS_CODE: &str = "PGRST116";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub key: String,
}

/// Client for the hosted database's REST interface.
///
/// Built without an endpoint it still answers every call, with
/// `StoreError::NotConfigured`, so the site can start and serve its bundled
/// defaults. Change notifications arrive through [`ChangeHub`], which the
/// webhook handler feeds.
pub struct RestStore {
    client: reqwest::Client,
    endpoint: Option<Endpoint>,
    changes: ChangeHub,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RestStore {
    pub fn new(endpoint: Option<Endpoint>, timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            changes: ChangeHub::default(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn changes(&self) -> &ChangeHub {
        &self.changes
    }

    fn request(&self, method: Method, table: Table) -> StoreResult<RequestBuilder> {
        let endpoint = self.endpoint.as_ref().ok_or(StoreError::NotConfigured)?;
        let url = format!("{}/rest/v1/{}", endpoint.url.trim_end_matches('/'), table);

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&endpoint.key)
            .map_err(|e| StoreError::Unavailable(format!("invalid access key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", endpoint.key))
            .map_err(|e| StoreError::Unavailable(format!("invalid access key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        debug!("{} {}", method, url);
        Ok(self.client.request(method, url).headers(headers))
    }

    async fn check(table: Table, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error: Option<PostgrestError> = serde_json::from_str(&body).ok();
        let code = error.as_ref().and_then(|e| e.code.as_deref());
        if status == StatusCode::NOT_ACCEPTABLE && code == Some(NO_ROWS_CODE) {
            return Err(StoreError::RowNotFound(table));
        }

        let message = error
            .and_then(|e| e.message)
            .unwrap_or(body);
        warn!("{} request rejected with {}: {}", table, status, message);
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn filter_param(filter: &Filter) -> (String, String) {
    let value = match &filter.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (filter.column.to_string(), format!("eq.{}", value))
}

fn order_param(order: &Order) -> (String, String) {
    let direction = if order.descending { "desc" } else { "asc" };
    ("order".to_string(), format!("{}.{}", order.column, direction))
}

impl RemoteStore for RestStore {
    async fn select(
        &self,
        table: Table,
        filter: Option<Filter>,
        order: Option<Order>,
    ) -> StoreResult<Vec<Value>> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        query.extend(filter.as_ref().map(filter_param));
        query.extend(order.as_ref().map(order_param));

        let response = self.request(Method::GET, table)?.query(&query).send().await?;
        let rows = Self::check(table, response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn select_one(&self, table: Table, filter: Filter) -> StoreResult<Value> {
        let query = [
            ("select".to_string(), "*".to_string()),
            filter_param(&filter),
        ];
        let response = self
            .request(Method::GET, table)?
            .header(ACCEPT, SINGLE_OBJECT)
            .query(&query)
            .send()
            .await?;
        let row = Self::check(table, response).await?.json::<Value>().await?;
        Ok(row)
    }

    async fn insert(&self, table: Table, row: Value) -> StoreResult<Value> {
        let response = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&[row])
            .send()
            .await?;
        let stored = Self::check(table, response).await?.json::<Value>().await?;
        Ok(stored)
    }

    async fn update(&self, table: Table, filter: Filter, patch: Value) -> StoreResult<Vec<Value>> {
        let response = self
            .request(Method::PATCH, table)?
            .header("Prefer", "return=representation")
            .query(&[filter_param(&filter)])
            .json(&patch)
            .send()
            .await?;
        let rows = Self::check(table, response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn delete(&self, table: Table, filter: Filter) -> StoreResult<Vec<Value>> {
        let response = self
            .request(Method::DELETE, table)?
            .header("Prefer", "return=representation")
            .query(&[filter_param(&filter)])
            .send()
            .await?;
        let rows = Self::check(table, response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    fn subscribe(&self) -> StoreResult<broadcast::Receiver<ChangeEvent>> {
        if !self.is_configured() {
            return Err(StoreError::NotConfigured);
        }
        Ok(self.changes.subscribe())
    }
}
