//! HTTP behaviour of the HIBP client against a mock server.

use vigil_core::breach::{BreachError, BreachLookup, HibpClient};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, api_key: Option<&str>) -> HibpClient {
    HibpClient::new(api_key.map(str::to_string))
        .with_endpoints(server.uri(), format!("{}/api/v3", server.uri()))
}

#[tokio::test]
async fn password_lookup_sends_only_the_hash_prefix() {
    let server = MockServer::start().await;

    // SHA-1("password") = 5BAA6 1E4C9B93F3F0682250B6CF8331B7EE68FD8
    Mock::given(method("GET"))
        .and(path("/range/5BAA6"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "003D68EB55068C33ACE09247EE4C639306B:3\r\n\
             1E4C9B93F3F0682250B6CF8331B7EE68FD8:9545824\r\n\
             01330C689E5D64F660D6947A93AD634EF8F:1",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, None).check_password("password").await.unwrap();

    assert!(result.is_pwned);
    assert_eq!(result.count, 9545824);
}

#[tokio::test]
async fn unknown_password_is_not_pwned() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/range/5BAA6"))
        .respond_with(ResponseTemplate::new(200).set_body_string("003D68EB55068C33ACE09247EE4C639306B:3"))
        .mount(&server)
        .await;

    let result = client(&server, None).check_password("password").await.unwrap();

    assert!(!result.is_pwned);
    assert_eq!(result.count, 0);
}

#[tokio::test]
async fn range_server_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server, None).check_password("password").await.unwrap_err();

    assert!(matches!(err, BreachError::Status { status: 503 }));
}

#[tokio::test]
async fn email_lookup_without_api_key_stays_offline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let breaches = client(&server, None).check_email("a@b.com").await.unwrap();

    assert!(breaches.is_empty());
}

#[tokio::test]
async fn email_lookup_parses_breaches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/breachedaccount/a@b.com"))
        .and(query_param("truncateResponse", "false"))
        .and(header("hibp-api-key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "Name": "Adobe",
                "Title": "Adobe",
                "Domain": "adobe.com",
                "BreachDate": "2013-10-04",
                "PwnCount": 152445165,
                "DataClasses": ["Email addresses", "Passwords"],
                "IsVerified": true
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let breaches = client(&server, Some("secret-key"))
        .check_email("a@b.com")
        .await
        .unwrap();

    assert_eq!(breaches.len(), 1);
    assert_eq!(breaches[0].name, "Adobe");
    assert_eq!(breaches[0].breach_date, "2013-10-04");
    assert!(breaches[0].is_verified);
    assert!(!breaches[0].is_sensitive);
}

#[tokio::test]
async fn unknown_email_returns_no_breaches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let breaches = client(&server, Some("secret-key"))
        .check_email("nobody@example.com")
        .await
        .unwrap();

    assert!(breaches.is_empty());
}

#[tokio::test]
async fn rejected_api_key_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server, Some("bad-key"))
        .check_email("a@b.com")
        .await
        .unwrap_err();

    assert!(matches!(err, BreachError::Status { status: 401 }));
}
