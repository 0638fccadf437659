use crate::greeter::v1::{GreetReply, GreetRequest, Profile, greeter_server::Greeter};
use crate::pb::{EchoRequest, EchoResponse, echo_service_server::EchoService};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status, Streaming};

const GREETING_PREFIX_KEY: &str = "x-greeting-prefix";
const GREETER_KEY: &str = "x-greeter";

pub struct EchoServiceImpl;

#[tonic::async_trait]
impl EchoService for EchoServiceImpl {
    type BidirectionalEchoStream = Pin<Box<dyn Stream<Item = Result<EchoResponse, Status>> + Send>>;
    type ServerStreamingEchoStream = ReceiverStream<Result<EchoResponse, Status>>;

    async fn unary_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<EchoResponse>, Status> {
        Ok(Response::new(EchoResponse {
            message: request.into_inner().message,
        }))
    }

    async fn server_streaming_echo(
        &self,
        request: Request<EchoRequest>,
    ) -> Result<Response<Self::ServerStreamingEchoStream>, Status> {
        let msg = request.into_inner().message;
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for i in 0..3 {
                let response = EchoResponse {
                    message: format!("{} - seq {}", msg, i),
                };
                tx.send(Ok(response)).await.ok();
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn client_streaming_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<EchoResponse>, Status> {
        let mut stream = request.into_inner();
        let mut full_msg = String::new();

        while let Some(req) = stream.next().await {
            let req = req?;
            full_msg.push_str(&req.message);
        }

        Ok(Response::new(EchoResponse { message: full_msg }))
    }

    async fn bidirectional_echo(
        &self,
        request: Request<Streaming<EchoRequest>>,
    ) -> Result<Response<Self::BidirectionalEchoStream>, Status> {
        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = in_stream.next().await {
                match result {
                    Ok(req) => {
                        let resp = EchoResponse {
                            message: format!("echo: {}", req.message),
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GreeterImpl {
    forever_closed: Arc<Notify>,
}

impl GreeterImpl {
    /// Notified once a `GreetForever` stream finds its caller gone.
    pub fn forever_stream_closed(&self) -> Arc<Notify> {
        self.forever_closed.clone()
    }
}

#[tonic::async_trait]
impl Greeter for GreeterImpl {
    type GreetThenFailStream = ReceiverStream<Result<GreetReply, Status>>;
    type GreetForeverStream = ReceiverStream<Result<GreetReply, Status>>;

    async fn greet(&self, request: Request<GreetRequest>) -> Result<Response<GreetReply>, Status> {
        let prefix = request
            .metadata()
            .get(GREETING_PREFIX_KEY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Hello")
            .to_string();

        let mut response = Response::new(GreetReply {
            greeting: format!("{} {}", prefix, request.into_inner().name),
        });
        response
            .metadata_mut()
            .insert(GREETER_KEY, MetadataValue::from_static("echo-service"));
        Ok(response)
    }

    async fn greet_then_fail(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<Self::GreetThenFailStream>, Status> {
        let name = request.into_inner().name;
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for i in 1..=3 {
                let reply = GreetReply {
                    greeting: format!("Hello {} #{}", name, i),
                };
                if tx.send(Ok(reply)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Err(Status::aborted("ran out of greetings"))).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn greet_forever(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<Self::GreetForeverStream>, Status> {
        let name = request.into_inner().name;
        let closed = self.forever_closed.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut i = 0u64;
            loop {
                i += 1;
                let reply = GreetReply {
                    greeting: format!("Hello {} #{}", name, i),
                };
                if tx.send(Ok(reply)).await.is_err() {
                    closed.notify_one();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn greet_slowly(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<GreetReply>, Status> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Response::new(GreetReply {
            greeting: format!("Hello {}", request.into_inner().name),
        }))
    }

    async fn echo_profile(&self, request: Request<Profile>) -> Result<Response<Profile>, Status> {
        Ok(Response::new(request.into_inner()))
    }
}
