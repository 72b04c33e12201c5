use std::time::Duration;

use archiver_engine::{FailureKind, FetchSettings, ReqwestTransport, Transport};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(route: &str, response: ResponseTemplate) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(&server)
        .await;
    let url = format!("{}{route}", server.uri());
    (server, url)
}

#[tokio::test]
async fn returns_body_and_content_type() {
    let (_server, url) = serve(
        "/post",
        ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
    )
    .await;

    let transport = ReqwestTransport::new(&FetchSettings::default()).unwrap();
    let output = transport.get(&url).await.expect("fetch ok");
    assert_eq!(output.bytes, b"<html>ok</html>");
    assert_eq!(output.final_url, url);
    assert!(output.content_type.unwrap().starts_with("text/html"));
}

#[tokio::test]
async fn missing_and_gone_map_to_not_found() {
    let transport = ReqwestTransport::new(&FetchSettings::default()).unwrap();
    for status in [404, 410] {
        let (_server, url) = serve("/missing", ResponseTemplate::new(status)).await;
        let err = transport.get(&url).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound, "status {status}");
    }
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let (_server, url) = serve("/busy", ResponseTemplate::new(429)).await;
    let transport = ReqwestTransport::new(&FetchSettings::default()).unwrap();
    let err = transport.get(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::RateLimited);
}

#[tokio::test]
async fn server_errors_are_transient() {
    let (_server, url) = serve("/broken", ResponseTemplate::new(503)).await;
    let transport = ReqwestTransport::new(&FetchSettings::default()).unwrap();
    let err = transport.get(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.kind.is_transient());
}

#[tokio::test]
async fn slow_response_times_out() {
    let (_server, url) = serve(
        "/slow",
        ResponseTemplate::new(200)
            .set_delay(Duration::from_millis(250))
            .set_body_string("slow"),
    )
    .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..FetchSettings::default()
    };
    let transport = ReqwestTransport::new(&settings).unwrap();
    let err = transport.get(&url).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(err.kind.is_transient());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (_server, url) = serve(
        "/large",
        ResponseTemplate::new(200).set_body_raw(vec![b'x'; 2048], "image/png"),
    )
    .await;

    let settings = FetchSettings {
        max_bytes: 1024,
        ..FetchSettings::default()
    };
    let transport = ReqwestTransport::new(&settings).unwrap();
    let err = transport.get(&url).await.unwrap_err();
    assert!(matches!(err.kind, FailureKind::TooLarge { max_bytes: 1024, .. }));
}

#[tokio::test]
async fn invalid_url_is_reported() {
    let transport = ReqwestTransport::new(&FetchSettings::default()).unwrap();
    let err = transport.get("not a url").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}
