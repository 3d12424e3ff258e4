//! In-process Flight endpoint used by the end-to-end tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use arrow_array::RecordBatch;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::flight_service_server::{FlightService, FlightServiceServer};
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaAsIpc, SchemaResult, Ticket,
};
use arrow_ipc::writer::IpcWriteOptions;
use arrow_schema::SchemaRef;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures::{Stream, StreamExt, TryStreamExt};
use prost::Message;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};
use tracing::info;

use crate::auth::{AUTHORIZATION, bearer_token_from_header};
use crate::session::{
    CLOSE_SESSION, CloseSessionResult, CloseSessionStatus, PROJECT_ID, SET_SESSION_OPTIONS,
    SessionOptionError, SessionOptionErrorValue, SetSessionOptionsRequest,
    SetSessionOptionsResult,
};

pub const SESSION_COOKIE: &str = "SESSION_ID";

type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// A call the server accepted, with the headers it arrived with.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub method: &'static str,
    pub metadata: MetadataMap,
}

#[derive(Default)]
struct Tokens(Mutex<HashSet<String>>);

impl Tokens {
    fn issue(&self, token: String) {
        self.0.lock().unwrap().insert(token);
    }
    fn is_valid(&self, token: &str) -> bool {
        self.0.lock().unwrap().contains(token)
    }
}

#[derive(Default)]
pub struct ServerState {
    users: HashMap<String, String>,
    queries: HashMap<String, (SchemaRef, Vec<RecordBatch>)>,
    tokens: Tokens,
    calls: Mutex<Vec<SeenCall>>,
    project_id: Mutex<Option<String>>,
    closed: Mutex<bool>,
}

impl ServerState {
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }

    /// Accept `token` as a personal access token.
    pub fn with_token(self, token: &str) -> Self {
        self.tokens.issue(token.into());
        self
    }

    pub fn with_query(mut self, sql: &str, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        self.queries.insert(sql.into(), (schema, batches));
        self
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.method).collect()
    }

    pub fn project_id(&self) -> Option<String> {
        self.project_id.lock().unwrap().clone()
    }

    pub fn session_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    fn record(&self, method: &'static str, metadata: &MetadataMap) {
        self.calls.lock().unwrap().push(SeenCall {
            method,
            metadata: metadata.clone(),
        });
    }

    fn authorize(&self, method: &'static str, metadata: &MetadataMap) -> Result<(), Status> {
        self.record(method, metadata);
        let token = metadata
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token_from_header)
            .ok_or_else(|| Status::unauthenticated("missing bearer token"))?;
        if !self.tokens.is_valid(token) {
            return Err(Status::unauthenticated("invalid token"));
        }
        Ok(())
    }

    fn lookup(
        &self,
        descriptor: &FlightDescriptor,
    ) -> Result<(String, &(SchemaRef, Vec<RecordBatch>)), Status> {
        let sql = String::from_utf8(descriptor.cmd.to_vec())
            .map_err(|_| Status::invalid_argument("query is not UTF-8"))?;
        let entry = self
            .queries
            .get(&sql)
            .ok_or_else(|| Status::invalid_argument(format!("unknown table in query: {sql}")))?;
        Ok((sql, entry))
    }
}

/// `(username, password)` out of a `Basic base64(user:pass)` header value.
fn decode_basic_authorization(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[derive(Clone)]
pub struct TestFlightService {
    state: Arc<ServerState>,
}

impl TestFlightService {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

fn internal(e: impl std::fmt::Display) -> Status {
    Status::internal(e.to_string())
}

#[tonic::async_trait]
impl FlightService for TestFlightService {
    type HandshakeStream = BoxedStream<HandshakeResponse>;
    type ListFlightsStream = BoxedStream<FlightInfo>;
    type DoGetStream = BoxedStream<FlightData>;
    type DoPutStream = BoxedStream<PutResult>;
    type DoExchangeStream = BoxedStream<FlightData>;
    type DoActionStream = BoxedStream<arrow_flight::Result>;
    type ListActionsStream = BoxedStream<ActionType>;

    async fn handshake(
        &self,
        mut request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        self.state.record("handshake", request.metadata());
        let (username, password) = request
            .metadata()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_basic_authorization)
            .ok_or_else(|| Status::unauthenticated("missing basic credentials"))?;
        let first = request
            .get_mut()
            .next()
            .await
            .ok_or_else(|| Status::invalid_argument("empty handshake"))??;

        if self.state.users.get(&username) != Some(&password) {
            return Err(Status::unauthenticated(format!(
                "Unable to authenticate user {username}"
            )));
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.state.tokens.issue(token.clone());
        info!(user = %username, "issued bearer token");

        let reply = HandshakeResponse {
            protocol_version: first.protocol_version,
            payload: Default::default(),
        };
        let mut response: Response<Self::HandshakeStream> =
            Response::new(Box::pin(futures::stream::once(async move { Ok(reply) })));
        let md = response.metadata_mut();
        let bearer: MetadataValue<Ascii> = format!("Bearer {token}").parse().map_err(internal)?;
        let cookie: MetadataValue<Ascii> =
            format!("{SESSION_COOKIE}={}; Path=/; HttpOnly", uuid::Uuid::new_v4())
                .parse()
                .map_err(internal)?;
        md.insert(AUTHORIZATION, bearer);
        md.insert("set-cookie", cookie);
        Ok(response)
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        Err(Status::unimplemented("list_flights"))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        self.state.authorize("get_flight_info", request.metadata())?;
        let descriptor = request.into_inner();
        let (sql, (schema, _)) = self.state.lookup(&descriptor)?;
        let info = FlightInfo::new()
            .try_with_schema(schema)
            .map_err(internal)?
            .with_descriptor(descriptor)
            .with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new(sql)));
        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info"))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        self.state.authorize("get_schema", request.metadata())?;
        let (_, (schema, _)) = self.state.lookup(request.get_ref())?;
        let options = IpcWriteOptions::default();
        let result =
            SchemaResult::try_from(SchemaAsIpc::new(schema, &options)).map_err(internal)?;
        Ok(Response::new(result))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        self.state.authorize("do_get", request.metadata())?;
        let descriptor = FlightDescriptor::new_cmd(request.into_inner().ticket);
        let (_, (schema, batches)) = self.state.lookup(&descriptor)?;
        let batches = futures::stream::iter(batches.clone().into_iter().map(Ok));
        let flight_data = FlightDataEncoderBuilder::new()
            .with_schema(schema.clone())
            .build(batches)
            .map_err(Status::from);
        Ok(Response::new(Box::pin(flight_data)))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        Err(Status::unimplemented("do_put"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange"))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let action = request.get_ref();
        let body = match action.r#type.as_str() {
            SET_SESSION_OPTIONS => {
                self.state.authorize("set_session_options", request.metadata())?;
                let req = SetSessionOptionsRequest::decode(action.body.as_ref())
                    .map_err(|e| Status::invalid_argument(e.to_string()))?;
                let mut result = SetSessionOptionsResult::default();
                for (name, value) in req.session_options {
                    match (name.as_str(), value.as_str()) {
                        (PROJECT_ID, Some(id)) if !id.is_empty() => {
                            *self.state.project_id.lock().unwrap() = Some(id.to_string());
                        }
                        (PROJECT_ID, _) => {
                            result.errors.insert(
                                name.clone(),
                                SessionOptionError {
                                    value: SessionOptionErrorValue::InvalidValue as i32,
                                },
                            );
                        }
                        _ => {
                            result.errors.insert(
                                name.clone(),
                                SessionOptionError {
                                    value: SessionOptionErrorValue::InvalidName as i32,
                                },
                            );
                        }
                    }
                }
                result.encode_to_vec()
            }
            CLOSE_SESSION => {
                self.state.authorize("close_session", request.metadata())?;
                *self.state.closed.lock().unwrap() = true;
                CloseSessionResult {
                    status: CloseSessionStatus::Closed as i32,
                }
                .encode_to_vec()
            }
            other => return Err(Status::unimplemented(format!("action {other}"))),
        };
        let result = arrow_flight::Result { body: body.into() };
        Ok(Response::new(Box::pin(futures::stream::once(async move {
            Ok(result)
        }))))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("list_actions"))
    }
}

/// Serves `state` on an ephemeral localhost port.
pub async fn start_test_server(state: Arc<ServerState>) -> (SocketAddr, JoinHandle<()>) {
    serve(state, Server::builder()).await
}

/// Like [`start_test_server`], but over TLS with the given PEM identity.
pub async fn start_tls_test_server(
    state: Arc<ServerState>,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> (SocketAddr, JoinHandle<()>) {
    let tls = ServerTlsConfig::new().identity(Identity::from_pem(cert_pem, key_pem));
    serve(state, Server::builder().tls_config(tls).unwrap()).await
}

async fn serve(state: Arc<ServerState>, mut builder: Server) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let svc = TestFlightService::new(state);
    let handle = tokio::spawn(async move {
        builder
            .add_service(FlightServiceServer::new(svc))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    (addr, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_decodes_to_credentials() {
        let header = crate::auth::basic_authorization("dremio", "dremio123");
        assert_eq!(
            decode_basic_authorization(&header),
            Some(("dremio".to_string(), "dremio123".to_string()))
        );
        assert_eq!(decode_basic_authorization("Bearer abc"), None);
        assert_eq!(decode_basic_authorization("Basic !!!"), None);
    }
}
