//! Metadata and inventory clients against a local mock of both services
//!
//! Tests cover:
//! - the token-then-read metadata exchange
//! - role credential lookup
//! - signed, paginated DescribeInstances reads
//! - error statuses surfacing as discovery errors

use fleetboot::config::FleetConfig;
use fleetboot::error::DiscoveryError;
use fleetboot::fleet::{Ec2Inventory, FleetInventory, FleetResolver, MetadataClient};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use warp::Filter;

const TOKEN: &str = "session-token-abc";

const PAGE_ONE: &str = r#"<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
    <reservationSet>
        <item>
            <instancesSet>
                <item>
                    <instanceId>i-0c</instanceId>
                    <privateIpAddress>10.0.2.13</privateIpAddress>
                </item>
                <item>
                    <instanceId>i-0a</instanceId>
                    <privateIpAddress>10.0.2.11</privateIpAddress>
                </item>
            </instancesSet>
        </item>
    </reservationSet>
    <nextToken>page-2</nextToken>
</DescribeInstancesResponse>"#;

const PAGE_TWO: &str = r#"<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
    <reservationSet>
        <item>
            <instancesSet>
                <item>
                    <instanceId>i-0b</instanceId>
                    <privateIpAddress>10.0.2.12</privateIpAddress>
                </item>
            </instancesSet>
        </item>
    </reservationSet>
</DescribeInstancesResponse>"#;

fn metadata_value(path: &str) -> Option<&'static str> {
    match path {
        "instance-id" => Some("i-0b"),
        "local-ipv4" => Some("10.0.2.12"),
        "placement/region" => Some("eu-west-1"),
        "tags/instance/cluster-group" => Some("analytics"),
        "iam/security-credentials" => Some("fleet-role\n"),
        "iam/security-credentials/fleet-role" => Some(
            r#"{"Code":"Success","AccessKeyId":"ASIAEXAMPLE","SecretAccessKey":"secret","Token":"role-token","Expiration":"2030-01-01T00:00:00Z"}"#,
        ),
        _ => None,
    }
}

async fn mock_metadata() -> SocketAddr {
    let token = warp::put()
        .and(warp::path!("latest" / "api" / "token"))
        .and(warp::header::<u32>("x-aws-ec2-metadata-token-ttl-seconds"))
        .map(|_ttl: u32| TOKEN);

    let meta = warp::get()
        .and(warp::path("latest"))
        .and(warp::path("meta-data"))
        .and(warp::path::tail())
        .and(warp::header::optional::<String>("x-aws-ec2-metadata-token"))
        .map(|tail: warp::path::Tail, token: Option<String>| {
            if token.as_deref() != Some(TOKEN) {
                return warp::reply::with_status(String::new(), StatusCode::UNAUTHORIZED);
            }
            match metadata_value(tail.as_str().trim_end_matches('/')) {
                Some(value) => warp::reply::with_status(value.to_string(), StatusCode::OK),
                None => warp::reply::with_status("Not Found".to_string(), StatusCode::NOT_FOUND),
            }
        });

    let (addr, server) = warp::serve(token.or(meta)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn mock_inventory(calls: Arc<AtomicUsize>) -> SocketAddr {
    let describe = warp::get()
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("authorization"))
        .map(move |query: HashMap<String, String>, authorization: Option<String>| {
            calls.fetch_add(1, Ordering::SeqCst);

            let signed = authorization.map_or(false, |a| a.starts_with("AWS4-HMAC-SHA256 Credential="));
            let filtered = query.get("Action").map(String::as_str) == Some("DescribeInstances")
                && query.get("Filter.1.Value.1").map(String::as_str) == Some("analytics")
                && query.get("Filter.2.Value.1").map(String::as_str) == Some("running");
            if !signed || !filtered {
                return warp::reply::with_status(
                    "<Response><Errors><Error><Code>InvalidRequest</Code><Message>bad</Message></Error></Errors></Response>".to_string(),
                    StatusCode::BAD_REQUEST,
                );
            }

            let page = match query.get("NextToken").map(String::as_str) {
                None => PAGE_ONE,
                Some("page-2") => PAGE_TWO,
                Some(_) => "",
            };
            warp::reply::with_status(page.to_string(), StatusCode::OK)
        });

    let (addr, server) = warp::serve(describe).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn fleet_config(metadata: SocketAddr, inventory: Option<SocketAddr>) -> FleetConfig {
    FleetConfig {
        metadata_endpoint: format!("http://{}", metadata),
        inventory_endpoint: inventory.map(|addr| format!("http://{}", addr)),
        request_timeout_secs: 5,
        ..FleetConfig::default()
    }
}

#[tokio::test]
async fn test_metadata_identity_and_tag() {
    let addr = mock_metadata().await;
    let client = MetadataClient::new(format!("http://{}/", addr), 60, Duration::from_secs(5)).unwrap();

    let identity = client.identity().await.unwrap();
    assert_eq!(identity.id, "i-0b");
    assert_eq!(identity.address, "10.0.2.12");
    assert_eq!(identity.region, "eu-west-1");

    assert_eq!(client.tag("cluster-group").await.unwrap(), "analytics");
}

#[tokio::test]
async fn test_role_credentials() {
    let addr = mock_metadata().await;
    let client = MetadataClient::new(format!("http://{}", addr), 60, Duration::from_secs(5)).unwrap();

    let credentials = client.role_credentials().await.unwrap();
    assert_eq!(credentials.access_key_id, "ASIAEXAMPLE");
    assert_eq!(credentials.secret_access_key, "secret");
    assert_eq!(credentials.session_token.as_deref(), Some("role-token"));
}

#[tokio::test]
async fn test_missing_attribute_is_a_status_error() {
    let addr = mock_metadata().await;
    let client = MetadataClient::new(format!("http://{}", addr), 60, Duration::from_secs(5)).unwrap();

    let err = client.tag("no-such-tag").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_unreachable_metadata_service() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = MetadataClient::new(format!("http://{}", addr), 60, Duration::from_secs(2)).unwrap();
    let err = client.token().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Http { .. }));
}

#[tokio::test]
async fn test_inventory_follows_pagination() {
    let calls = Arc::new(AtomicUsize::new(0));
    let metadata = mock_metadata().await;
    let inventory_addr = mock_inventory(calls.clone()).await;
    let inventory = Ec2Inventory::new(&fleet_config(metadata, Some(inventory_addr))).unwrap();

    let resolver = FleetResolver::new(inventory).await.unwrap();
    assert_eq!(resolver.group(), "analytics");
    assert_eq!(resolver.identity().id, "i-0b");

    let snapshot = resolver.snapshot().await.unwrap();
    let ids: Vec<&str> = snapshot.ids().collect();
    assert_eq!(ids, vec!["i-0a", "i-0b", "i-0c"]);
    assert_eq!(snapshot.address_of("i-0c"), Some("10.0.2.13"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inventory_error_document() {
    let calls = Arc::new(AtomicUsize::new(0));
    let metadata = mock_metadata().await;
    let inventory_addr = mock_inventory(calls).await;
    let inventory = Ec2Inventory::new(&fleet_config(metadata, Some(inventory_addr))).unwrap();

    // Region is resolved lazily, identity first
    inventory.identity().await.unwrap();
    let err = inventory.running_members("some-other-group").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Status { status: 400, .. }));
}
