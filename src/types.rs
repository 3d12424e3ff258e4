use arrow_array::RecordBatch;
use arrow_flight::{FlightDescriptor, FlightInfo, Ticket};
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::context::CallContext;
use crate::error::Result;
use crate::output::QueryStats;
use crate::session::{
    CloseSessionRequest, CloseSessionResult, SetSessionOptionsRequest, SetSessionOptionsResult,
};

/// Record batches of one result set, in stream order.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RecordBatch>> + Send + 'static>>;

/// The Flight calls a run needs. Implemented over gRPC by
/// [`crate::client::GrpcFlightClient`]; tests substitute their own.
#[async_trait]
pub trait FlightClient: Send {
    /// Basic-auth handshake. Returns `ctx` extended with the session bearer token.
    async fn authenticate_basic_token(
        &mut self,
        ctx: &CallContext,
        username: &str,
        password: &str,
    ) -> Result<CallContext>;

    /// Discover the Arrow schema of the result set a descriptor names.
    async fn get_schema(
        &mut self,
        ctx: &CallContext,
        descriptor: FlightDescriptor,
    ) -> Result<SchemaRef>;

    async fn get_flight_info(
        &mut self,
        ctx: &CallContext,
        descriptor: FlightDescriptor,
    ) -> Result<FlightInfo>;

    /// Open the record stream behind a ticket.
    async fn do_get(&mut self, ctx: &CallContext, ticket: Ticket) -> Result<BatchStream>;

    async fn set_session_options(
        &mut self,
        ctx: &CallContext,
        request: SetSessionOptionsRequest,
    ) -> Result<SetSessionOptionsResult>;

    async fn close_session(
        &mut self,
        ctx: &CallContext,
        request: CloseSessionRequest,
    ) -> Result<CloseSessionResult>;
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub authenticated: bool,
    /// `None` when no query was supplied.
    pub query: Option<QueryStats>,
}
