use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, FlightDescriptor, FlightInfo, HandshakeRequest, Ticket};
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use prost::Message;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tracing::debug;

use crate::auth::token_from_handshake;
use crate::context::CallContext;
use crate::error::{ClientError, Result};
use crate::interceptor::{CookieInterceptor, CookieJar};
use crate::session::{
    CLOSE_SESSION, CloseSessionRequest, CloseSessionResult, SET_SESSION_OPTIONS,
    SetSessionOptionsRequest, SetSessionOptionsResult,
};
use crate::types::{BatchStream, FlightClient};
use crate::utils::schema_from_result;

type Inner = FlightServiceClient<InterceptedService<Channel, CookieInterceptor>>;

/// [`FlightClient`] over a tonic channel, replaying server cookies on every call.
#[derive(Clone, Debug)]
pub struct GrpcFlightClient {
    inner: Inner,
    cookies: CookieJar,
}

impl GrpcFlightClient {
    pub fn new(channel: Channel) -> Self {
        let cookies = CookieJar::default();
        let inner =
            FlightServiceClient::with_interceptor(channel, CookieInterceptor::new(cookies.clone()));
        Self { inner, cookies }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Runs an action and returns the body of every result message.
    async fn do_action(
        &mut self,
        op: &'static str,
        ctx: &CallContext,
        action: Action,
    ) -> Result<Vec<Bytes>> {
        let resp = self
            .inner
            .do_action(ctx.request(action))
            .await
            .map_err(ClientError::rpc(op))?;
        self.cookies.store_from(resp.metadata());
        let bodies = resp
            .into_inner()
            .map_ok(|result| result.body)
            .try_collect::<Vec<_>>()
            .await
            .map_err(ClientError::rpc(op))?;
        debug!(action = op, results = bodies.len(), "action completed");
        Ok(bodies)
    }
}

#[async_trait]
impl FlightClient for GrpcFlightClient {
    async fn authenticate_basic_token(
        &mut self,
        ctx: &CallContext,
        username: &str,
        password: &str,
    ) -> Result<CallContext> {
        let handshake = futures::stream::iter(vec![HandshakeRequest {
            protocol_version: 0,
            payload: Bytes::new(),
        }]);
        let req = ctx.clone().with_basic(username, password)?.request(handshake);

        let resp = self
            .inner
            .handshake(req)
            .await
            .map_err(ClientError::rpc("authenticate"))?;
        self.cookies.store_from(resp.metadata());
        let headers = resp.metadata().clone();

        let mut stream = resp.into_inner();
        let mut payload = Vec::new();
        while let Some(message) = stream
            .message()
            .await
            .map_err(ClientError::rpc("authenticate"))?
        {
            payload.extend_from_slice(&message.payload);
        }

        let token = token_from_handshake(&headers, &payload)?;
        ctx.clone().with_bearer(&token)
    }

    async fn get_schema(
        &mut self,
        ctx: &CallContext,
        descriptor: FlightDescriptor,
    ) -> Result<SchemaRef> {
        let resp = self
            .inner
            .get_schema(ctx.request(descriptor))
            .await
            .map_err(ClientError::rpc("get_schema"))?;
        self.cookies.store_from(resp.metadata());
        schema_from_result(resp.get_ref())
    }

    async fn get_flight_info(
        &mut self,
        ctx: &CallContext,
        descriptor: FlightDescriptor,
    ) -> Result<FlightInfo> {
        let resp = self
            .inner
            .get_flight_info(ctx.request(descriptor))
            .await
            .map_err(ClientError::rpc("get_flight_info"))?;
        self.cookies.store_from(resp.metadata());
        Ok(resp.into_inner())
    }

    async fn do_get(&mut self, ctx: &CallContext, ticket: Ticket) -> Result<BatchStream> {
        let resp = self
            .inner
            .do_get(ctx.request(ticket))
            .await
            .map_err(ClientError::rpc("do_get"))?;
        self.cookies.store_from(resp.metadata());
        let flight_data = resp.into_inner().map_err(FlightError::from);
        let batches =
            FlightRecordBatchStream::new_from_flight_data(flight_data).map_err(ClientError::from);
        Ok(Box::pin(batches))
    }

    async fn set_session_options(
        &mut self,
        ctx: &CallContext,
        request: SetSessionOptionsRequest,
    ) -> Result<SetSessionOptionsResult> {
        let action = Action::new(SET_SESSION_OPTIONS, request.encode_to_vec());
        let bodies = self.do_action("set_session_options", ctx, action).await?;
        match bodies.first() {
            Some(body) => Ok(SetSessionOptionsResult::decode(body.as_ref())?),
            None => Ok(SetSessionOptionsResult::default()),
        }
    }

    async fn close_session(
        &mut self,
        ctx: &CallContext,
        request: CloseSessionRequest,
    ) -> Result<CloseSessionResult> {
        let action = Action::new(CLOSE_SESSION, request.encode_to_vec());
        let bodies = self.do_action("close_session", ctx, action).await?;
        match bodies.first() {
            Some(body) => Ok(CloseSessionResult::decode(body.as_ref())?),
            None => Ok(CloseSessionResult::default()),
        }
    }
}
