//! Configuration hot reload.

mod common;

use std::time::Duration;

use federation_gateway::config::RequestHeaderRule;
use federation_gateway::Telemetry;

use common::*;

#[tokio::test]
async fn test_reload_swaps_header_rules() {
    let products = start_mock_subgraph("products").await;
    let mut config = gateway_config(&[("products", &products, &[])]);
    config.headers.all.request = vec![RequestHeaderRule::named("X-Before")];
    let gateway = start_gateway(config.clone(), Telemetry::Disabled).await;
    let client = reqwest::Client::new();
    let headers = [("X-Before", "1"), ("X-After", "2")];

    post_query(&client, &gateway.graphql_url(), "{ products }", &headers).await;
    let first = products.last_headers();
    assert!(first.contains_key("x-before"));
    assert!(!first.contains_key("x-after"));

    config.headers.all.request = vec![RequestHeaderRule::named("X-After")];
    gateway.updates.send(config).unwrap();

    let url = gateway.graphql_url();
    let swapped = eventually(Duration::from_secs(5), || {
        let client = client.clone();
        let url = url.clone();
        let products = &products;
        async move {
            post_query(&client, &url, "{ products }", &headers).await;
            let last = products.last_headers();
            last.contains_key("x-after") && !last.contains_key("x-before")
        }
    })
    .await;
    assert!(swapped, "new header rules were not applied");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_invalid_reload_keeps_previous_rules() {
    let products = start_mock_subgraph("products").await;
    let mut config = gateway_config(&[("products", &products, &[])]);
    config.headers.all.request = vec![RequestHeaderRule::named("X-Keep")];
    let gateway = start_gateway(config.clone(), Telemetry::Disabled).await;
    let client = reqwest::Client::new();

    config.headers.all.request = vec![RequestHeaderRule::matching("[")];
    gateway.updates.send(config).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = post_query(
        &client,
        &gateway.graphql_url(),
        "{ products }",
        &[("X-Keep", "yes")],
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(products.last_headers()["x-keep"], "yes");

    gateway.shutdown.trigger();
}
