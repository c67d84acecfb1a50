//! reqwest-based storefront API client

use super::bearer::BearerSlot;
use super::errors::ApiError;
use super::SessionApi;
use crate::config::Config;
use crate::types::{
    AuthResponse, Credentials, DeleteAccountRequest, ProfileUpdate, Registration, UserEnvelope,
    UserProfile,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Per-request unique ID header, echoed in backend logs.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client for the storefront REST API.
///
/// Authenticated calls read the bearer token from the [`BearerSlot`] shared
/// with the session's token store.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer: BearerSlot,
}

impl ApiClient {
    pub fn new(config: &Config, bearer: BearerSlot) -> Result<Self, ApiError> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ApiError::InvalidUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url,
            bearer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(value) = self.bearer.header_value() {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder
    }

    async fn execute(&self, builder: RequestBuilder, path: &str) -> Result<String, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::debug_span!("api_call", path, request_id = %request_id);

        async move {
            let response = builder
                .header(REQUEST_ID_HEADER, &request_id)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                debug!("{} -> {}", path, status.as_u16());
                Ok(body)
            } else {
                warn!("{} -> {}", path, status.as_u16());
                Err(ApiError::from_status(status.as_u16(), &body))
            }
        }
        .instrument(span)
        .await
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let text = self.execute(builder, path).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Like [`call`](Self::call) but ignores the response body.
    async fn call_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder, path).await.map(|_| ())
    }
}

#[async_trait]
impl SessionApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.call(Method::POST, "/login", Some(credentials)).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        self.call(Method::POST, "/register", Some(registration))
            .await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.call_unit::<()>(Method::POST, "/logout", None).await
    }

    async fn fetch_user(&self) -> Result<UserProfile, ApiError> {
        self.call::<(), UserEnvelope>(Method::GET, "/user", None)
            .await
            .map(UserEnvelope::into_profile)
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.call::<_, UserEnvelope>(Method::POST, "/user/update", Some(update))
            .await
            .map(UserEnvelope::into_profile)
    }

    async fn delete_user(&self, password: &str) -> Result<(), ApiError> {
        let body = DeleteAccountRequest { password };
        self.call_unit(Method::POST, "/user/delete", Some(&body))
            .await
    }
}
