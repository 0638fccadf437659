use echo_service::{
    EchoServiceImpl, EchoServiceServer, FILE_DESCRIPTOR_SET, GreeterImpl, GreeterServer, PROTO_DIR,
};
use futures_util::StreamExt;
use grpcproxy_core::error::{ErrorKind, GatewayError, Stage};
use grpcproxy_core::gateway::{Gateway, GatewayConfig, SchemaQuery, TargetRequest};
use grpcproxy_core::grpc::InvocationEvent;
use grpcproxy_core::json::encoder::ResponseEncoder;
use grpcproxy_core::schema::describe::SymbolDescription;
use serde_json::{Value, json};
use std::time::Duration;
use tonic::service::Routes;

/// An in-process peer serving both fixture services plus reflection.
fn peer() -> Routes {
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();

    Routes::new(reflection)
        .add_service(EchoServiceServer::new(EchoServiceImpl))
        .add_service(GreeterServer::new(GreeterImpl::default()))
}

fn request(method: &str, data: Value) -> TargetRequest {
    serde_json::from_value(json!({
        "address": "in-process",
        "method": method,
        "data": data,
    }))
    .unwrap()
}

async fn body_lines(gateway: &Gateway, request: TargetRequest) -> Vec<Value> {
    let invocation = gateway
        .call_on(peer(), request)
        .await
        .expect("Failed to start call");

    let encoder = ResponseEncoder::new();
    invocation
        .filter_map(|event| {
            let line = encoder.encode(&event).expect("Failed to render event");
            async move { line.map(|l| serde_json::from_slice(&l).unwrap()) }
        })
        .collect()
        .await
}

#[tokio::test]
async fn test_greet_through_reflection() {
    let lines = body_lines(
        &Gateway::default(),
        request("greeter.v1.Greeter/Greet", json!({ "name": "Ada" })),
    )
    .await;

    assert_eq!(lines, vec![json!({ "greeting": "Hello Ada" })]);
}

#[tokio::test]
async fn test_greet_with_proto_file() {
    let mut request = request("greeter.v1.Greeter/Greet", json!({ "name": "Ada" }));
    request.proto = Some(format!("{PROTO_DIR}/greeter.proto"));
    request.import_path = Some(PROTO_DIR.to_string());

    // This peer has no reflection service.
    let invocation = Gateway::default()
        .call_on(GreeterServer::new(GreeterImpl::default()), request)
        .await
        .expect("Failed to start call");

    let messages: Vec<_> = invocation
        .filter_map(|event| async move {
            match event {
                InvocationEvent::Message(m) => Some(ResponseEncoder::new().to_json(&m).unwrap()),
                _ => None,
            }
        })
        .collect()
        .await;

    assert_eq!(messages, vec![json!({ "greeting": "Hello Ada" })]);
}

#[tokio::test]
async fn test_request_headers_become_metadata() {
    let mut request = request("greeter.v1.Greeter/Greet", json!({ "name": "Ada" }));
    request
        .headers
        .insert("x-greeting-prefix".to_string(), "Ahoy".to_string());

    let lines = body_lines(&Gateway::default(), request).await;

    assert_eq!(lines, vec![json!({ "greeting": "Ahoy Ada" })]);
}

#[tokio::test]
async fn test_profile_survives_the_round_trip() {
    let profile = json!({
        "name": "Ada",
        "visits": "12",
        "tags": ["math"],
        "scores": { "chess": 7 },
        "mood": "MOOD_GRUMPY",
        "address": { "city": "London", "country": "UK" }
    });

    let lines = body_lines(
        &Gateway::default(),
        request("greeter.v1.Greeter/EchoProfile", profile.clone()),
    )
    .await;

    assert_eq!(lines, vec![profile]);
}

#[tokio::test]
async fn test_mid_stream_failure_is_the_last_line() {
    let lines = body_lines(
        &Gateway::default(),
        request("greeter.v1.Greeter/GreetThenFail", json!({ "name": "Ada" })),
    )
    .await;

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[2], json!({ "greeting": "Hello Ada #3" }));
    assert_eq!(lines[3]["error"]["kind"], "PeerRejected");
    assert_eq!(lines[3]["error"]["code"], "Aborted");
}

#[tokio::test]
async fn test_configured_call_timeout_applies() {
    let gateway = Gateway::new(GatewayConfig {
        call_timeout: Some(Duration::from_millis(50)),
        ..GatewayConfig::default()
    });

    let lines = body_lines(
        &gateway,
        request("greeter.v1.Greeter/GreetSlowly", json!({ "name": "Ada" })),
    )
    .await;

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["error"]["kind"], "DeadlineExceeded");
}

#[tokio::test]
async fn test_unknown_method() {
    let result = Gateway::default()
        .call_on(peer(), request("greeter.v1.Greeter/Ghost", json!({})))
        .await;

    let err = result.err().expect("Expected an error");
    assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    assert_eq!(err.stage(), Stage::Decode);
}

#[tokio::test]
async fn test_reflection_unsupported() {
    let result = Gateway::default()
        .call_on(
            EchoServiceServer::new(EchoServiceImpl),
            request("echo.EchoService/UnaryEcho", json!({ "message": "hi" })),
        )
        .await;

    let err = result.err().expect("Expected an error");
    assert_eq!(err.kind(), ErrorKind::ReflectionUnsupported);
    assert_eq!(err.stage(), Stage::Resolve);
}

#[tokio::test]
async fn test_invalid_body_fails_before_traffic() {
    let result = Gateway::default()
        .call_on(
            peer(),
            request("greeter.v1.Greeter/Greet", json!({ "name": 42, "extra": 1 })),
        )
        .await;

    let err = result.err().expect("Expected an error");
    assert_eq!(err.kind(), ErrorKind::DecodeError);
    assert_eq!(err.payload().to_json()["error"]["stage"], "decode");
}

#[tokio::test]
async fn test_invalid_metadata_key() {
    let mut request = request("greeter.v1.Greeter/Greet", json!({ "name": "Ada" }));
    request
        .headers
        .insert("not a header".to_string(), "x".to_string());

    let result = Gateway::default().call_on(peer(), request).await;

    assert!(matches!(result, Err(GatewayError::Invoke(_))));
}

#[tokio::test]
async fn test_list_and_describe_through_reflection() {
    let gateway = Gateway::default();
    let query = SchemaQuery::default();

    let services = gateway.list_on(peer(), &query).await.unwrap();
    let greeter = services
        .iter()
        .find(|s| s.name == "greeter.v1.Greeter")
        .expect("Greeter not listed");
    assert!(greeter.methods.contains(&"greeter.v1.Greeter/Greet".to_string()));

    let description = gateway
        .describe_on(peer(), &query, "greeter.v1.Greeter/EchoProfile")
        .await
        .unwrap();
    assert!(matches!(description, SymbolDescription::Method(_)));

    let missing = gateway.describe_on(peer(), &query, "greeter.v1.Nope").await;
    assert_eq!(missing.err().map(|e| e.kind()), Some(ErrorKind::MethodNotFound));
}

#[tokio::test]
async fn test_list_offline_from_proto_file() {
    let query = SchemaQuery {
        address: None,
        proto: Some(format!("{PROTO_DIR}/greeter.proto")),
        import_path: None,
    };

    let services = Gateway::default().list(&query).await.unwrap();

    let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["greeter.v1.Greeter"]);
}
