use client::detect::{DetectionSession, detect_selected};
use client::transport::ReqwestTransport;
use serde_json::json;
use shared::{SortDirection, SortKey};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(server: &MockServer) -> ReqwestTransport {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    ReqwestTransport::new(base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn detect_over_http_fills_sorted_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/detect/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "detections": [
                {"class": "dog", "confidence": 0.62, "bbox": [1, 2, 3, 4]},
                {"label": "cat", "confidence": 97},
                {"confidence": 0.88}
            ],
            "output_image": "/media/detect_output/pets.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let mut session = DetectionSession::new();
    session
        .select_image("pets.jpg", "image/jpeg", vec![0xff, 0xd8, 0xff])
        .unwrap();

    assert!(detect_selected(&mut session, &transport).await.unwrap());
    assert_eq!(session.error(), None);

    let labels: Vec<_> = session
        .table()
        .sorted()
        .iter()
        .map(|r| (r.label.clone(), r.confidence_percent))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("Cat".to_string(), 97),
            ("Object 3".to_string(), 88),
            ("Dog".to_string(), 62)
        ]
    );
    assert_eq!(session.table().aggregates().confident, 2);
    assert_eq!(
        session.image_source(),
        Some("/media/detect_output/pets.png")
    );

    let state = session.select_sort(SortKey::Label);
    assert_eq!(state.direction, SortDirection::Desc);
    let state = session.select_sort(SortKey::Label);
    assert_eq!(state.direction, SortDirection::Asc);
    assert_eq!(session.table().sorted()[0].label, "Cat");
}

#[tokio::test]
async fn detect_error_body_becomes_session_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/detect/"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Model not loaded"})),
        )
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let mut session = DetectionSession::new();
    session
        .select_image("pets.png", "image/png", vec![0x89, 0x50])
        .unwrap();

    detect_selected(&mut session, &transport).await.unwrap();

    assert_eq!(session.error(), Some("Model not loaded"));
    assert!(session.table().is_empty());
    assert!(!session.is_detecting());
}
