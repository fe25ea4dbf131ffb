//! Shared helpers for integration tests: socket guard and a canned category API.
#![allow(dead_code)]

pub mod socket_guard;

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// API path served by the mock.
pub const API_PATH: &str = "/w/api.php";

/// Endpoint URL of a mock server.
pub fn api_url(server: &MockServer) -> String {
    format!("{}{API_PATH}", server.uri())
}

fn pages(pages: Value) -> Value {
    json!({ "batchcomplete": true, "query": { "pages": pages } })
}

fn category(id: u64, title: &str, subcats: u64, page_count: u64) -> Value {
    json!({
        "pageid": id,
        "ns": 14,
        "title": format!("Category:{title}"),
        "categoryinfo": { "size": subcats + page_count, "pages": page_count, "files": 0, "subcats": subcats }
    })
}

fn article(id: u64, title: &str) -> Value {
    json!({ "pageid": id, "ns": 0, "title": title })
}

/// Mounts a listing for one category id.
pub async fn mount_listing(server: &MockServer, id: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("generator", "categorymembers"))
        .and(query_param("gcmpageid", id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the title lookup for `Category:Birds`.
pub async fn mount_birds_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("titles", "Category:Birds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pages(json!([
            category(10, "Birds", 2, 1)
        ]))))
        .mount(server)
        .await;
}

/// Birds(10) → Birds of prey(11) → Owls(21); Birds → Seabirds(12, leaf category).
///
/// Articles: Bird under Birds, Raptor under Birds of prey, Barn owl under
/// Owls, Albatross and Puffin under Seabirds.
pub async fn mount_birds_api(server: &MockServer) {
    mount_birds_lookup(server).await;
    mount_listing(
        server,
        10,
        pages(json!([
            category(11, "Birds of prey", 1, 1),
            category(12, "Seabirds", 0, 2),
            article(101, "Bird"),
        ])),
    )
    .await;
    mount_listing(
        server,
        11,
        pages(json!([category(21, "Owls", 0, 1), article(111, "Raptor")])),
    )
    .await;
    mount_listing(
        server,
        12,
        pages(json!([article(121, "Albatross"), article(122, "Puffin")])),
    )
    .await;
    mount_listing(server, 21, pages(json!([article(211, "Barn owl")]))).await;
}
