//! REST client for the wiki API.
//!
//! Thin wrapper over `reqwest` that speaks the three contracts the client
//! core consumes: paginated list endpoints, the reader profile, and chapter
//! metadata.  Every failure is mapped onto [`FetchError`].

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use mangawiki_shared::{Chapter, FetchError, PageEnvelope, ProfilePatch, UserProfile};

/// Remote home of the signed-in reader's profile.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn get_profile(&self) -> Result<UserProfile, FetchError>;

    async fn patch_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, FetchError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A bearer token was supplied, so profile calls go to the server.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// `GET /{resource}?page=n&limit=m&<filters>`
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        resource: &str,
        page: u32,
        limit: u32,
        filters: &Value,
    ) -> Result<PageEnvelope<T>, FetchError> {
        let url = format!("{}/{}", self.base_url, resource.trim_matches('/'));

        let mut query = vec![("page".to_string(), page.to_string()), ("limit".to_string(), limit.to_string())];
        query.extend(filter_query(filters));

        debug!(%url, page, limit, "fetching list page");

        let req = self.authorize(self.http.get(&url)).query(&query);
        self.send(req).await
    }

    /// Fetcher for [`PagedCache::get_page`](crate::cache::PagedCache::get_page)
    /// bound to one resource, page size and filter set.
    pub fn page_fetcher<T>(
        &self,
        resource: &str,
        limit: u32,
        filters: &Value,
    ) -> impl FnOnce(u32) -> BoxFuture<'static, Result<PageEnvelope<T>, FetchError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let resource = resource.to_string();
        let filters = filters.clone();
        move |page| {
            async move { client.fetch_page(&resource, page, limit, &filters).await }.boxed()
        }
    }

    /// `GET /chapters/{number}`
    pub async fn get_chapter(&self, number: u32) -> Result<Chapter, FetchError> {
        let url = format!("{}/chapters/{}", self.base_url, number);
        let req = self.authorize(self.http.get(&url));
        self.send(req).await
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, FetchError> {
        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProfileApi for ApiClient {
    async fn get_profile(&self) -> Result<UserProfile, FetchError> {
        let url = format!("{}/users/profile", self.base_url);
        let req = self.authorize(self.http.get(&url));
        self.send(req).await
    }

    async fn patch_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, FetchError> {
        let url = format!("{}/users/profile", self.base_url);
        let req = self.authorize(self.http.patch(&url)).json(patch);
        self.send(req).await
    }
}

/// Flatten a filter object into query pairs, in key order.
///
/// Arrays repeat the key, nested objects are sent as JSON, nulls are skipped.
fn filter_query(filters: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = filters else {
        return Vec::new();
    };

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut pairs = Vec::new();
    for key in keys {
        match &map[key.as_str()] {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(v) = scalar(item) {
                        pairs.push((key.clone(), v));
                    }
                }
            }
            other => {
                if let Some(v) = scalar(other) {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// NestJS error bodies carry `message` as a string or a list of strings.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("message")) {
        Some(Value::String(msg)) => msg.clone(),
        Some(Value::Array(msgs)) => msgs
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filters_flatten_in_key_order() {
        let pairs = filter_query(&json!({
            "status": "approved",
            "arc": null,
            "tags": ["crew", "navy"],
            "chapter": 40,
        }));
        assert_eq!(
            pairs,
            vec![
                ("chapter".to_string(), "40".to_string()),
                ("status".to_string(), "approved".to_string()),
                ("tags".to_string(), "crew".to_string()),
                ("tags".to_string(), "navy".to_string()),
            ]
        );
    }

    #[test]
    fn non_object_filters_add_nothing() {
        assert!(filter_query(&Value::Null).is_empty());
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(error_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(
            error_message(r#"{"message":["userProgress must not be greater than 539","bad"]}"#),
            "userProgress must not be greater than 539; bad"
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn base_url_is_normalized() {
        let api = ApiClient::new("http://localhost:3001/", None);
        assert_eq!(api.base_url(), "http://localhost:3001");
        assert!(!api.is_authenticated());
    }
}
