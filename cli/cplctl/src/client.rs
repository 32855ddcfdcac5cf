//! HTTP client for the Control Plane REST API.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::cpln::CplnCli;
use crate::error::CliError;

pub const API_HOST: &str = "https://api.cpln.io";
pub const LOGS_HOST: &str = "https://logs.cpln.io";

/// Which API host a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Api,
    Logs,
}

/// Base URLs of the API hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHosts {
    pub api: String,
    pub logs: String,
}

impl Default for ApiHosts {
    fn default() -> Self {
        Self {
            api: API_HOST.to_string(),
            logs: LOGS_HOST.to_string(),
        }
    }
}

impl ApiHosts {
    /// Default hosts, with `CPLN_ENDPOINT` overriding the API host.
    pub fn from_env() -> Self {
        let mut hosts = Self::default();
        if let Ok(endpoint) = std::env::var("CPLN_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                hosts.api = endpoint.trim().to_string();
            }
        }
        hosts
    }

    fn base(&self, host: Host) -> &str {
        let base = match host {
            Host::Api => &self.api,
            Host::Logs => &self.logs,
        };
        base.trim_end_matches('/')
    }
}

/// A validated API token.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Accepts `CPLN_TOKEN` style and `cpln profile token` style tokens.
    pub fn parse(raw: &str) -> Result<Self, CliError> {
        let token = raw.trim();
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(CliError::InvalidToken)
        }
    }

    fn header(&self) -> Result<HeaderValue, CliError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))
            .map_err(|_| CliError::InvalidToken)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiToken(..)")
    }
}

/// Outcome of an API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// 200 with a JSON body.
    Json(Value),
    /// 202, the request was accepted.
    Accepted,
    /// 404.
    NotFound,
}

/// Named resource with its creation time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Deployment {
    pub name: String,
    #[serde(default)]
    pub status: DeploymentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// API client for the Control Plane REST API.
///
/// The token is resolved on the first request and reused afterwards.
pub struct ApiClient {
    client: reqwest::Client,
    hosts: ApiHosts,
    env_token: Option<String>,
    cli: CplnCli,
    token: OnceCell<ApiToken>,
}

impl ApiClient {
    /// Create a client. `env_token` is the value of `CPLN_TOKEN`, if set;
    /// otherwise `cli` is asked for the current profile's token.
    pub fn new(hosts: ApiHosts, env_token: Option<String>, cli: CplnCli) -> Result<Self, CliError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            hosts,
            env_token: env_token.filter(|token| !token.trim().is_empty()),
            cli,
            token: OnceCell::new(),
        })
    }

    async fn token(&self) -> Result<&ApiToken, CliError> {
        self.token
            .get_or_try_init(|| async {
                let raw = match &self.env_token {
                    Some(token) => token.clone(),
                    None => self.cli.profile_token().await?,
                };
                ApiToken::parse(&raw)
            })
            .await
    }

    /// Build a URL for an endpoint.
    fn url(&self, host: Host, path: &str) -> String {
        format!("{}{}", self.hosts.base(host), path)
    }

    /// Make a request and map the status code.
    pub async fn call(
        &self,
        method: Method,
        host: Host,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, CliError> {
        let token = self.token().await?;
        let url = self.url(host, path);
        debug!(%method, %url, "calling API");

        let mut request = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, token.header()?);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        debug!(%url, status, "API responded");

        match status {
            200 => {
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(ApiResponse::Json(Value::Null));
                }
                let value = serde_json::from_str(&text)
                    .map_err(|e| unexpected(path, &format!("invalid JSON: {e}")))?;
                Ok(ApiResponse::Json(value))
            }
            202 => Ok(ApiResponse::Accepted),
            404 => Ok(ApiResponse::NotFound),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(CliError::api(status, body))
            }
        }
    }

    /// GET returning `None` on 404.
    async fn get_optional(
        &self,
        host: Host,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, CliError> {
        match self.call(Method::GET, host, path, query, None).await? {
            ApiResponse::Json(value) => Ok(Some(value)),
            ApiResponse::NotFound => Ok(None),
            ApiResponse::Accepted => Err(unexpected(path, "202 Accepted without a body")),
        }
    }

    /// GET of a list; a missing parent is an error.
    async fn get_items<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, CliError> {
        let value = self
            .get_optional(Host::Api, path, &[])
            .await?
            .ok_or_else(|| CliError::NotFound(format!("Can't find '{path}'.")))?;
        decode_items(path, value)
    }

    /// A write that succeeds with either 200 or 202.
    async fn write(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(), CliError> {
        match self.call(method, Host::Api, path, &[], body).await? {
            ApiResponse::Json(_) | ApiResponse::Accepted => Ok(()),
            ApiResponse::NotFound => Err(CliError::NotFound(format!("Can't find '{path}'."))),
        }
    }

    // gvc

    pub async fn gvc_list(&self, org: &str) -> Result<Vec<Resource>, CliError> {
        self.get_items(&format!("/org/{org}/gvc")).await
    }

    pub async fn gvc_get(&self, org: &str, gvc: &str) -> Result<Option<Value>, CliError> {
        self.get_optional(Host::Api, &format!("/org/{org}/gvc/{gvc}"), &[]).await
    }

    pub async fn gvc_delete(&self, org: &str, gvc: &str) -> Result<(), CliError> {
        self.write(Method::DELETE, &format!("/org/{org}/gvc/{gvc}"), None)
            .await
    }

    // image

    pub async fn image_delete(&self, org: &str, image: &str) -> Result<(), CliError> {
        self.write(Method::DELETE, &format!("/org/{org}/image/{image}"), None)
            .await
    }

    // workload

    /// Workloads whose name matches `workload` exactly (`=`) or partially (`~`).
    pub async fn query_workloads(
        &self,
        org: &str,
        gvc: &str,
        workload: &str,
        partial_match: bool,
    ) -> Result<Vec<Resource>, CliError> {
        let path = format!("/org/{org}/gvc/{gvc}/workload/-query");
        let body = json!({
            "kind": "workload",
            "spec": {
                "match": "all",
                "terms": [
                    { "rel": "gvc", "op": "=", "value": gvc },
                    { "property": "name", "op": if partial_match { "~" } else { "=" }, "value": workload },
                ],
            },
        });

        match self.call(Method::POST, Host::Api, &path, &[], Some(&body)).await? {
            ApiResponse::Json(value) => decode_items(&path, value),
            ApiResponse::NotFound => Ok(Vec::new()),
            ApiResponse::Accepted => Err(unexpected(&path, "202 Accepted without a body")),
        }
    }

    pub async fn workload_get(
        &self,
        org: &str,
        gvc: &str,
        workload: &str,
    ) -> Result<Option<Value>, CliError> {
        self.get_optional(
            Host::Api,
            &format!("/org/{org}/gvc/{gvc}/workload/{workload}"),
            &[],
        )
        .await
    }

    pub async fn workload_update(
        &self,
        org: &str,
        gvc: &str,
        workload: &str,
        data: &Value,
    ) -> Result<(), CliError> {
        self.write(
            Method::PATCH,
            &format!("/org/{org}/gvc/{gvc}/workload/{workload}"),
            Some(data),
        )
        .await
    }

    pub async fn workload_delete(&self, org: &str, gvc: &str, workload: &str) -> Result<(), CliError> {
        self.write(
            Method::DELETE,
            &format!("/org/{org}/gvc/{gvc}/workload/{workload}"),
            None,
        )
        .await
    }

    pub async fn workload_deployments(
        &self,
        org: &str,
        gvc: &str,
        workload: &str,
    ) -> Result<Vec<Deployment>, CliError> {
        self.get_items(&format!(
            "/org/{org}/gvc/{gvc}/workload/{workload}/deployment"
        ))
        .await
    }

    // domain

    pub async fn domain_list(&self, org: &str) -> Result<Vec<Value>, CliError> {
        self.get_items(&format!("/org/{org}/domain")).await
    }

    pub async fn domain_update(&self, org: &str, domain: &str, data: &Value) -> Result<(), CliError> {
        self.write(Method::PATCH, &format!("/org/{org}/domain/{domain}"), Some(data))
            .await
    }

    // logs

    /// Query stored logs of a workload between two instants.
    pub async fn log_query(
        &self,
        org: &str,
        gvc: &str,
        workload: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Value, CliError> {
        let path = format!("/logs/org/{org}/loki/api/v1/query_range");
        let query = [
            ("query", format!("{{gvc=\"{gvc}\",workload=\"{workload}\"}}")),
            ("limit", limit.to_string()),
            ("direction", "forward".to_string()),
            ("start", timestamp_nanos(from).to_string()),
            ("end", timestamp_nanos(to).to_string()),
        ];

        self.get_optional(Host::Logs, &path, &query)
            .await?
            .ok_or_else(|| CliError::NotFound(format!("Can't find logs for workload '{workload}'.")))
    }
}

fn decode_items<T: DeserializeOwned>(path: &str, value: Value) -> Result<Vec<T>, CliError> {
    let list: ItemList<T> =
        serde_json::from_value(value).map_err(|e| unexpected(path, &e.to_string()))?;
    Ok(list.items)
}

fn unexpected(path: &str, detail: &str) -> CliError {
    CliError::UnexpectedResponse {
        path: path.to_string(),
        detail: detail.to_string(),
    }
}

fn timestamp_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp().saturating_mul(1_000_000_000))
}
