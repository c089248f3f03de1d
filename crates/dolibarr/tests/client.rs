use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atelier_dolibarr::{ClientError, DolibarrClient, DolibarrSource};

#[tokio::test]
async fn lists_send_the_api_key_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/index.php/thirdparties"))
        .and(header("DOLAPIKEY", "secret"))
        .and(query_param("limit", "10000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1", "name": "Acme"},
            {"id": "2", "name": "Globex"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = DolibarrClient::new(&server.uri(), "secret").unwrap();
    let items = client
        .get_list("thirdparties", &[("limit", "10000"), ("sortfield", "t.rowid")])
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["name"], "Globex");
}

#[tokio::test]
async fn not_found_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/index.php/projects"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"code": 404}})))
        .mount(&server)
        .await;

    let client = DolibarrClient::new(&server.uri(), "k").unwrap();
    assert!(client.get_list("projects", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn error_payload_with_ok_status_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/index.php/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": {"message": "No contact found"}})))
        .mount(&server)
        .await;

    let client = DolibarrClient::new(&server.uri(), "k").unwrap();
    assert!(client.get_list("contacts", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn other_failures_carry_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/index.php/thirdparties"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = DolibarrClient::new(&format!("{}/", server.uri()), "bad").unwrap();
    let err = client.test_connection().await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 401, .. }), "{err:?}");
}
