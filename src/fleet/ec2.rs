//! Cloud inventory backed by the EC2 `DescribeInstances` query API

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::FleetConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::types::{FleetMember, FleetSnapshot, NodeIdentity};
use super::metadata::{read_body, MetadataClient};
use super::sigv4::{self, Credentials, SignableRequest};
use super::FleetInventory;

const API_VERSION: &str = "2016-11-15";
const SERVICE: &str = "ec2";

/// Inventory implementation for EC2 fleets
#[derive(Debug)]
pub struct Ec2Inventory {
    metadata: MetadataClient,
    http: reqwest::Client,
    endpoint: Option<String>,
    group_tag_key: String,
    region: OnceCell<String>,
}

impl Ec2Inventory {
    pub fn new(config: &FleetConfig) -> DiscoveryResult<Self> {
        let metadata = MetadataClient::new(
            config.metadata_endpoint.clone(),
            config.metadata_token_ttl_secs,
            config.request_timeout(),
        )?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| DiscoveryError::Http {
                url: "inventory client".to_string(),
                source,
            })?;

        Ok(Ec2Inventory {
            metadata,
            http,
            endpoint: config.inventory_endpoint.clone(),
            group_tag_key: config.group_tag_key.clone(),
            region: OnceCell::new(),
        })
    }

    async fn region(&self) -> DiscoveryResult<&str> {
        self.region
            .get_or_try_init(|| self.metadata.region())
            .await
            .map(String::as_str)
    }

    async fn credentials(&self) -> DiscoveryResult<Credentials> {
        match Credentials::from_env() {
            Some(credentials) => Ok(credentials),
            None => self.metadata.role_credentials().await,
        }
    }

    async fn describe_page(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        region: &str,
        group: &str,
        next_token: Option<&str>,
    ) -> DiscoveryResult<String> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| DiscoveryError::Malformed(format!("inventory endpoint {}: {}", endpoint, e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(DiscoveryError::Malformed(format!("inventory endpoint {} has no host", endpoint)))
            }
        };

        let params = describe_params(&self.group_tag_key, group, next_token);
        let signed = sigv4::sign(
            credentials,
            &SignableRequest {
                host: &host,
                path: "/",
                query: &params,
                service: SERVICE,
                region,
            },
            Utc::now(),
        );

        let request_url = format!("{}/?{}", endpoint.trim_end_matches('/'), signed.query_string);
        let mut request = self.http.get(&request_url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|source| DiscoveryError::Http {
            url: endpoint.to_string(),
            source,
        })?;
        read_body(endpoint, response).await
    }
}

#[async_trait]
impl FleetInventory for Ec2Inventory {
    async fn identity(&self) -> DiscoveryResult<NodeIdentity> {
        let identity = self.metadata.identity().await?;
        let _ = self.region.set(identity.region.clone());
        Ok(identity)
    }

    async fn group_name(&self) -> DiscoveryResult<String> {
        self.metadata.tag(&self.group_tag_key).await
    }

    async fn running_members(&self, group: &str) -> DiscoveryResult<FleetSnapshot> {
        let region = self.region().await?.to_string();
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com", region));
        let credentials = self.credentials().await?;

        let mut members = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let body = self
                .describe_page(&endpoint, &credentials, &region, group, next_token.as_deref())
                .await?;
            let page = parse_describe_instances(&body)?;
            debug!(page_members = page.members.len(), more = page.next_token.is_some(), "read inventory page");

            members.extend(page.members);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(FleetSnapshot::from_members(members))
    }
}

/// Query parameters selecting running members of the group
pub fn describe_params(tag_key: &str, group: &str, next_token: Option<&str>) -> Vec<(String, String)> {
    let mut params = vec![
        ("Action".to_string(), "DescribeInstances".to_string()),
        ("Version".to_string(), API_VERSION.to_string()),
        ("Filter.1.Name".to_string(), format!("tag:{}", tag_key)),
        ("Filter.1.Value.1".to_string(), group.to_string()),
        ("Filter.2.Name".to_string(), "instance-state-name".to_string()),
        ("Filter.2.Value.1".to_string(), "running".to_string()),
    ];
    if let Some(token) = next_token {
        params.push(("NextToken".to_string(), token.to_string()));
    }
    params
}

/// One page of a `DescribeInstances` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribePage {
    pub members: Vec<FleetMember>,
    pub next_token: Option<String>,
}

/// Extract `(instanceId, privateIpAddress)` pairs and the pagination token.
///
/// Within an instance item the instance-level `privateIpAddress` precedes
/// `networkInterfaceSet`, so the first address after each `instanceId` is
/// the instance's primary address.
pub fn parse_describe_instances(xml: &str) -> DiscoveryResult<DescribePage> {
    if let Some(code) = element_text(xml, "Code", 0).map(|(text, _)| text) {
        let message = element_text(xml, "Message", 0).map(|(t, _)| t).unwrap_or_default();
        return Err(DiscoveryError::Malformed(format!("inventory error {}: {}", code, message)));
    }

    let mut members = Vec::new();
    let mut cursor = 0;
    while let Some(set_start) = find_from(xml, "<instancesSet>", cursor) {
        let set_end = find_from(xml, "</instancesSet>", set_start)
            .ok_or_else(|| DiscoveryError::Malformed("unterminated instancesSet".to_string()))?;
        let set = &xml[set_start..set_end];

        let mut starts = Vec::new();
        let mut pos = 0;
        while let Some(start) = find_from(set, "<instanceId>", pos) {
            starts.push(start);
            pos = start + 1;
        }

        for (i, start) in starts.iter().enumerate() {
            let limit = starts.get(i + 1).copied().unwrap_or(set.len());
            let item = &set[*start..limit];
            let (id, _) = element_text(item, "instanceId", 0)
                .ok_or_else(|| DiscoveryError::Malformed("unterminated instanceId".to_string()))?;
            let (address, _) = element_text(item, "privateIpAddress", 0)
                .ok_or_else(|| DiscoveryError::Malformed(format!("instance {} has no private address", id)))?;
            members.push(FleetMember::new(id, address));
        }

        cursor = set_end;
    }

    let next_token = match xml.rfind("<nextToken>") {
        Some(pos) => element_text(xml, "nextToken", pos)
            .map(|(text, _)| text.to_string())
            .filter(|t| !t.is_empty()),
        None => None,
    };

    Ok(DescribePage { members, next_token })
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|i| i + from)
}

/// Text of the first `<tag>...</tag>` at or after `from`, and the index past its closing tag
fn element_text<'a>(xml: &'a str, tag: &str, from: usize) -> Option<(&'a str, usize)> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = find_from(xml, &open, from)? + open.len();
    let end = find_from(xml, &close, start)?;
    Some((xml[start..end].trim(), end + close.len()))
}
