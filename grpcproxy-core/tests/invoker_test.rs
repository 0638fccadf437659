use echo_service::{
    EchoServiceImpl, EchoServiceServer, FILE_DESCRIPTOR_SET, GreeterImpl, GreeterServer,
};
use futures_util::StreamExt;
use grpcproxy_core::error::ErrorKind;
use grpcproxy_core::grpc::{CallStatus, DynamicInvoker, InvocationEvent, InvokeOptions};
use grpcproxy_core::json::decoder::RequestDecoder;
use grpcproxy_core::json::encoder::ResponseEncoder;
use grpcproxy_core::schema::{MethodShape, SchemaOrigin, ServiceSchema};
use prost_reflect::DescriptorPool;
use serde_json::{Value, json};
use std::time::Duration;
use tonic::Code;
use tonic::service::Routes;

fn schema() -> ServiceSchema {
    let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
    ServiceSchema::new(pool, SchemaOrigin::File("descriptors.bin".into()))
}

fn routes() -> Routes {
    routes_with(GreeterImpl::default())
}

fn routes_with(greeter: GreeterImpl) -> Routes {
    Routes::new(EchoServiceServer::new(EchoServiceImpl)).add_service(GreeterServer::new(greeter))
}

/// The JSON messages of a finished invocation and its terminal status.
struct Outcome {
    events: Vec<InvocationEvent>,
    messages: Vec<Value>,
    status: CallStatus,
}

async fn run(method: &str, body: Value, options: InvokeOptions) -> Outcome {
    let decoded = RequestDecoder::strict()
        .decode(&schema(), method, body)
        .expect("Failed to decode request");

    let invocation = DynamicInvoker::new(routes())
        .invoke(decoded.method, decoded.messages, options)
        .expect("Failed to start invocation");

    collect(invocation.collect().await)
}

fn collect(events: Vec<InvocationEvent>) -> Outcome {
    let encoder = ResponseEncoder::new();

    let messages = events
        .iter()
        .filter_map(|event| match event {
            InvocationEvent::Message(message) => Some(encoder.to_json(message).unwrap()),
            _ => None,
        })
        .collect();

    let statuses: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            InvocationEvent::Status(status) => Some(status.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(statuses.len(), 1, "Expected exactly one status event");
    assert!(
        matches!(events.last(), Some(InvocationEvent::Status(_))),
        "The status must be the last event"
    );

    Outcome {
        status: statuses[0].clone(),
        events,
        messages,
    }
}

#[tokio::test]
async fn test_unary() {
    let outcome = run(
        "echo.EchoService/UnaryEcho",
        json!({ "message": "hello" }),
        InvokeOptions::default(),
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.messages, vec![json!({ "message": "hello" })]);
    assert!(matches!(outcome.events[0], InvocationEvent::Headers(_)));
}

#[tokio::test]
async fn test_server_streaming() {
    let outcome = run(
        "echo.EchoService/ServerStreamingEcho",
        json!({ "message": "stream" }),
        InvokeOptions::default(),
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(
        outcome.messages,
        vec![
            json!({ "message": "stream - seq 0" }),
            json!({ "message": "stream - seq 1" }),
            json!({ "message": "stream - seq 2" }),
        ]
    );
}

#[tokio::test]
async fn test_client_streaming() {
    let outcome = run(
        "echo.EchoService/ClientStreamingEcho",
        json!([{ "message": "A" }, { "message": "B" }, { "message": "C" }]),
        InvokeOptions::default(),
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.messages, vec![json!({ "message": "ABC" })]);
}

#[tokio::test]
async fn test_bidirectional_streaming() {
    let outcome = run(
        "echo.EchoService/BidirectionalEcho",
        json!([{ "message": "Ping" }, { "message": "Pong" }]),
        InvokeOptions::default(),
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(
        outcome.messages,
        vec![
            json!({ "message": "echo: Ping" }),
            json!({ "message": "echo: Pong" }),
        ]
    );
}

#[tokio::test]
async fn test_events_are_ordered() {
    let outcome = run(
        "echo.EchoService/ServerStreamingEcho",
        json!({ "message": "order" }),
        InvokeOptions::default(),
    )
    .await;

    let labels: Vec<_> = outcome
        .events
        .iter()
        .map(|event| match event {
            InvocationEvent::Headers(_) => "headers",
            InvocationEvent::Message(_) => "message",
            InvocationEvent::Trailers(_) => "trailers",
            InvocationEvent::Status(_) => "status",
        })
        .collect();

    assert_eq!(
        labels,
        vec!["headers", "message", "message", "message", "trailers", "status"]
    );
}

#[tokio::test]
async fn test_peer_failure_after_messages() {
    let outcome = run(
        "greeter.v1.Greeter/GreetThenFail",
        json!({ "name": "Ada" }),
        InvokeOptions::default(),
    )
    .await;

    assert_eq!(
        outcome.messages,
        vec![
            json!({ "greeting": "Hello Ada #1" }),
            json!({ "greeting": "Hello Ada #2" }),
            json!({ "greeting": "Hello Ada #3" }),
        ]
    );
    assert_eq!(outcome.status.code(), Code::Aborted);
    assert_eq!(outcome.status.kind(), Some(ErrorKind::PeerRejected));
    assert_eq!(outcome.status.message(), "ran out of greetings");
}

#[tokio::test]
async fn test_metadata_reaches_the_peer() {
    let outcome = run(
        "greeter.v1.Greeter/Greet",
        json!({ "name": "Ada" }),
        InvokeOptions {
            headers: vec![("x-greeting-prefix".to_string(), "Howdy".to_string())],
            timeout: None,
        },
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.messages, vec![json!({ "greeting": "Howdy Ada" })]);
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let outcome = run(
        "greeter.v1.Greeter/GreetSlowly",
        json!({ "name": "Ada" }),
        InvokeOptions {
            headers: vec![],
            timeout: Some(Duration::from_millis(50)),
        },
    )
    .await;

    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.status.kind(), Some(ErrorKind::DeadlineExceeded));
    assert_eq!(outcome.status.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_cancel_stops_an_endless_stream() {
    let decoded = RequestDecoder::strict()
        .decode(&schema(), "greeter.v1.Greeter/GreetForever", json!({ "name": "Ada" }))
        .unwrap();

    let mut invocation = DynamicInvoker::new(routes())
        .invoke(decoded.method, decoded.messages, InvokeOptions::default())
        .unwrap();

    assert_eq!(invocation.shape(), MethodShape::ServerStreaming);

    loop {
        match invocation.next().await {
            Some(InvocationEvent::Message(_)) => break,
            Some(_) => continue,
            None => panic!("Stream ended before the first message"),
        }
    }

    // Let the peer fill the event buffer before cancelling.
    tokio::time::sleep(Duration::from_millis(300)).await;
    invocation.cancel_handle().cancel();

    let after_cancel: Vec<_> = invocation.collect().await;
    assert!(
        !after_cancel
            .iter()
            .any(|event| matches!(event, InvocationEvent::Message(_))),
        "No message may be delivered after cancel"
    );

    let outcome = collect(after_cancel);
    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.status.kind(), Some(ErrorKind::Canceled));
    assert_eq!(outcome.status.code(), Code::Cancelled);
}

#[tokio::test]
async fn test_dropping_the_invocation_closes_the_peer_stream() {
    let greeter = GreeterImpl::default();
    let closed = greeter.forever_stream_closed();

    let decoded = RequestDecoder::strict()
        .decode(&schema(), "greeter.v1.Greeter/GreetForever", json!({ "name": "Ada" }))
        .unwrap();

    let mut invocation = DynamicInvoker::new(routes_with(greeter))
        .invoke(decoded.method, decoded.messages, InvokeOptions::default())
        .unwrap();

    let mut received = 0;
    while received < 2 {
        match invocation.next().await {
            Some(InvocationEvent::Message(_)) => received += 1,
            Some(_) => continue,
            None => panic!("Stream ended early"),
        }
    }

    drop(invocation);

    tokio::time::timeout(Duration::from_secs(2), closed.notified())
        .await
        .expect("The peer kept streaming after the invocation was dropped");
}

#[tokio::test]
async fn test_undecodable_item_keeps_earlier_items() {
    let outcome = run(
        "echo.EchoService/ClientStreamingEcho",
        json!([
            { "message": "A" },
            { "message": "B" },
            { "unknown": true },
            { "message": "D" }
        ]),
        InvokeOptions::default(),
    )
    .await;

    // Items 1 and 2 were sent before the stream was half-closed.
    assert_eq!(outcome.messages, vec![json!({ "message": "AB" })]);
    assert_eq!(outcome.status.kind(), Some(ErrorKind::DecodeError));
    assert_eq!(outcome.status.code(), Code::InvalidArgument);
    assert!(outcome.status.message().contains("#3"));
}

#[tokio::test]
async fn test_empty_client_stream() {
    let outcome = run(
        "echo.EchoService/ClientStreamingEcho",
        Value::Null,
        InvokeOptions::default(),
    )
    .await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.messages, vec![json!({ "message": "" })]);
}

#[tokio::test]
async fn test_unimplemented_method_is_rejected_by_peer() {
    // The schema knows the Greeter, but the peer only serves the EchoService.
    let decoded = RequestDecoder::strict()
        .decode(&schema(), "greeter.v1.Greeter/Greet", json!({ "name": "Ada" }))
        .unwrap();

    let invocation = DynamicInvoker::new(EchoServiceServer::new(EchoServiceImpl))
        .invoke(decoded.method, decoded.messages, InvokeOptions::default())
        .unwrap();

    let outcome = collect(invocation.collect().await);
    assert!(outcome.messages.is_empty());
    assert_eq!(outcome.status.code(), Code::Unimplemented);
    assert_eq!(outcome.status.kind(), Some(ErrorKind::PeerRejected));
}
