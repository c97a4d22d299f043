use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;

use crate::store::{Filter, FilterOp, Relation, Select, Store, StoreError, StoreResult};
use crate::types::api::StoreErrorBody;

/// Client for the hosted PostgREST-style query API.
///
/// Filters travel as query parameters (`col=eq.v`, `col=is.null`,
/// `col=in.(a,b)`), ordering as `order=col.asc`, windows as an inclusive
/// `Range` header, and foreign-key expansion inside `select`. Writes ask
/// for `return=representation` so callers get the stored rows back.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestStore {
    pub fn new(project_url: &str, api_key: &str, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = format!("{}/rest/v1", project_url.trim_end_matches('/'));

        tracing::info!(base_url = %base_url, "query API client initialized");

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            access_token: RwLock::new(None),
        })
    }

    /// Act as the signed-in user instead of the anonymous key.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap() = token;
    }

    fn request(&self, method: Method, relation: Relation) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.api_key.clone());

        self.client
            .request(method, format!("{}/{}", self.base_url, relation))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Vec<Value>> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StoreErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), message = %message, "query API rejected request");
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Value>(&body)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

/// Quote list members that would otherwise break the `in.(...)` syntax.
fn render_list_item(value: &Value) -> String {
    let raw = render_scalar(value);
    if raw.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw
    }
}

pub fn filter_param(filter: &Filter) -> (String, String) {
    let value = match &filter.op {
        FilterOp::Eq(v) => format!("eq.{}", render_scalar(v)),
        FilterOp::Is(v) => format!("is.{}", v.as_str()),
        FilterOp::In(vs) => {
            let items: Vec<String> = vs.iter().map(render_list_item).collect();
            format!("in.({})", items.join(","))
        }
    };
    (filter.column.to_string(), value)
}

/// Query parameters for a select.
pub fn select_params(query: &Select) -> Vec<(String, String)> {
    let mut columns = vec!["*".to_string()];
    for embed in &query.embeds {
        columns.push(format!("{}(*)", embed.relation));
    }

    let mut params = vec![("select".to_string(), columns.join(","))];
    params.extend(query.filters.iter().map(filter_param));
    if let Some(order) = query.order {
        params.push(("order".into(), format!("{}.{}", order.column, order.direction)));
    }
    params
}

impl Store for RestStore {
    async fn select(&self, query: Select) -> StoreResult<Vec<Value>> {
        let mut builder = self
            .request(Method::GET, query.relation)
            .query(&select_params(&query));

        if let Some((first, last)) = query.range.and_then(|r| r.inclusive_bounds()) {
            builder = builder
                .header("Range-Unit", "items")
                .header("Range", format!("{first}-{last}"));
        } else if query.range.is_some() {
            // empty window
            return Ok(Vec::new());
        }

        tracing::debug!(relation = %query.relation, "select");
        self.send(builder).await
    }

    async fn insert(&self, relation: Relation, row: Value) -> StoreResult<Vec<Value>> {
        tracing::debug!(relation = %relation, "insert");
        let builder = self
            .request(Method::POST, relation)
            .headers(representation())
            .json(&row);
        self.send(builder).await
    }

    async fn update(&self, relation: Relation, filters: Vec<Filter>, patch: Value) -> StoreResult<Vec<Value>> {
        tracing::debug!(relation = %relation, filters = filters.len(), "update");
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        let builder = self
            .request(Method::PATCH, relation)
            .query(&params)
            .headers(representation())
            .json(&patch);
        self.send(builder).await
    }

    async fn delete(&self, relation: Relation, filters: Vec<Filter>) -> StoreResult<Vec<Value>> {
        tracing::debug!(relation = %relation, filters = filters.len(), "delete");
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        let builder = self
            .request(Method::DELETE, relation)
            .query(&params)
            .headers(representation());
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IsValue;
    use crate::types::pagination::SortDirection;

    #[test]
    fn feed_query_encoding() {
        let query = Select::from(Relation::Posts)
            .with_author()
            .is("sold", IsValue::False)
            .is("parent", IsValue::Null)
            .order("created_at", SortDirection::Desc);

        let params = select_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*,profiles(*)".to_string()),
                ("sold".to_string(), "is.false".to_string()),
                ("parent".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
            ]
        );
    }

    #[test]
    fn eq_and_in_filters() {
        assert_eq!(
            filter_param(&Filter::eq("post_id", 42)),
            ("post_id".to_string(), "eq.42".to_string())
        );
        assert_eq!(
            filter_param(&Filter::eq("user_id", "abc")),
            ("user_id".to_string(), "eq.abc".to_string())
        );
        assert_eq!(
            filter_param(&Filter::one_of("id", [1, 2, 3])),
            ("id".to_string(), "in.(1,2,3)".to_string())
        );
        assert_eq!(
            filter_param(&Filter::one_of("name", ["a,b", "c"])),
            ("name".to_string(), "in.(\"a,b\",c)".to_string())
        );
    }

    #[test]
    fn base_url_is_normalized() {
        let store = RestStore::new("https://project.example.co/", "anon", Duration::from_secs(5)).unwrap();
        assert_eq!(store.base_url, "https://project.example.co/rest/v1");
    }
}
