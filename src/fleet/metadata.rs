//! Instance metadata client using the session-token (IMDSv2) exchange

use std::time::Duration;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::types::NodeIdentity;
use super::sigv4::Credentials;

const TOKEN_PATH: &str = "/latest/api/token";
const META_PREFIX: &str = "/latest/meta-data/";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Client for the link-local instance metadata service
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base: String,
    token_ttl_secs: u32,
}

/// Role credential document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

impl MetadataClient {
    pub fn new(base: impl Into<String>, token_ttl_secs: u32, timeout: Duration) -> DiscoveryResult<Self> {
        let base = base.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| DiscoveryError::Http { url: base.clone(), source })?;

        Ok(MetadataClient {
            http,
            base: base.trim_end_matches('/').to_string(),
            token_ttl_secs,
        })
    }

    /// Request a short-lived session token
    pub async fn token(&self) -> DiscoveryResult<String> {
        let url = format!("{}{}", self.base, TOKEN_PATH);
        let response = self
            .http
            .put(&url)
            .header(TOKEN_TTL_HEADER, self.token_ttl_secs.to_string())
            .send()
            .await
            .map_err(|source| DiscoveryError::Http { url: url.clone(), source })?;

        let token = read_body(&url, response).await?;
        if token.is_empty() {
            return Err(DiscoveryError::MissingAttribute("api/token".to_string()));
        }
        Ok(token)
    }

    /// Read one metadata attribute with an existing token
    pub async fn attribute(&self, token: &str, path: &str) -> DiscoveryResult<String> {
        let url = format!("{}{}{}", self.base, META_PREFIX, path);
        let response = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|source| DiscoveryError::Http { url: url.clone(), source })?;

        let value = read_body(&url, response).await?;
        if value.is_empty() {
            return Err(DiscoveryError::MissingAttribute(path.to_string()));
        }
        debug!(path, "read metadata attribute");
        Ok(value)
    }

    /// Instance id, private address and region under one token
    pub async fn identity(&self) -> DiscoveryResult<NodeIdentity> {
        let token = self.token().await?;
        Ok(NodeIdentity {
            id: self.attribute(&token, "instance-id").await?,
            address: self.attribute(&token, "local-ipv4").await?,
            region: self.attribute(&token, "placement/region").await?,
        })
    }

    pub async fn region(&self) -> DiscoveryResult<String> {
        let token = self.token().await?;
        self.attribute(&token, "placement/region").await
    }

    /// Value of one of this instance's tags
    pub async fn tag(&self, key: &str) -> DiscoveryResult<String> {
        let token = self.token().await?;
        self.attribute(&token, &format!("tags/instance/{}", key)).await
    }

    /// Temporary credentials of the instance role
    pub async fn role_credentials(&self) -> DiscoveryResult<Credentials> {
        let token = self.token().await?;
        let roles = self.attribute(&token, "iam/security-credentials/").await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| DiscoveryError::Credentials("no instance role attached".to_string()))?;

        let document = self
            .attribute(&token, &format!("iam/security-credentials/{}", role))
            .await?;
        let parsed: RoleCredentials = serde_json::from_str(&document)
            .map_err(|e| DiscoveryError::Malformed(format!("role credentials: {}", e)))?;

        Ok(Credentials {
            access_key_id: parsed.access_key_id,
            secret_access_key: parsed.secret_access_key,
            session_token: parsed.token,
        })
    }
}

/// Body of a successful response, trimmed
pub(crate) async fn read_body(url: &str, response: reqwest::Response) -> DiscoveryResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| DiscoveryError::Http { url: url.to_string(), source })?;

    if !status.is_success() {
        return Err(DiscoveryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(body.trim().to_string())
}
