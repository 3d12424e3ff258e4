use std::sync::Arc;

use arrow_flight::{FlightDescriptor, FlightInfo, SchemaResult, Ticket};
use arrow_schema::{Schema, SchemaRef};

use crate::error::{ClientError, Result};

/// `CMD` descriptor whose command bytes are the raw SQL text.
pub fn descriptor_for_query(query: &str) -> FlightDescriptor {
    FlightDescriptor::new_cmd(query.to_string())
}

/// Ticket of the first endpoint; the result set is read from that partition only.
pub fn first_ticket(info: &FlightInfo) -> Result<Ticket> {
    info.endpoint
        .first()
        .and_then(|endpoint| endpoint.ticket.clone())
        .ok_or(ClientError::MissingTicket)
}

pub fn schema_from_result(result: &SchemaResult) -> Result<SchemaRef> {
    let schema = Schema::try_from(result)?;
    Ok(Arc::new(schema))
}
