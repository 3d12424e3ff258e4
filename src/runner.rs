use std::io::Write;

use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::config::{Credentials, FlightConfig};
use crate::context::{CallContext, ROUTING_ENGINE};
use crate::error::Result;
use crate::output::{QueryStats, ResultPrinter};
use crate::session::{CloseSessionRequest, SetSessionOptionsRequest};
use crate::types::{BatchStream, FlightClient, RunSummary};
use crate::utils::{descriptor_for_query, first_ticket};

/// Routing headers plus every configured client property.
pub fn initial_context(config: &FlightConfig) -> Result<CallContext> {
    let mut ctx = CallContext::routing();
    for (key, value) in &config.client_properties {
        ctx = ctx.with_header(key, value)?;
    }
    if let Some(engine) = &config.engine {
        ctx = ctx.with_header(ROUTING_ENGINE, engine)?;
    }
    Ok(ctx)
}

/// Authenticate, optionally run the configured query, and print its results to `out`.
///
/// With a bearer token and a project id the session is opened before the
/// query and closed after it, whether or not the query succeeded.
pub async fn run_with_client<C, W>(
    config: &FlightConfig,
    client: &mut C,
    out: W,
) -> Result<RunSummary>
where
    C: FlightClient + ?Sized,
    W: Write + Send,
{
    let ctx = initial_context(config)?;

    match &config.credentials {
        Credentials::Bearer(token) => {
            let ctx = ctx.with_bearer(token)?;
            info!("using bearer token authentication");

            let Some(project_id) = config.project_id.as_deref() else {
                let query = run_query(config, client, &ctx, out).await?;
                return Ok(RunSummary {
                    authenticated: true,
                    query,
                });
            };

            set_session_options(client, &ctx, project_id).await?;
            let outcome = run_query(config, client, &ctx, out).await;
            match client.close_session(&ctx, CloseSessionRequest::default()).await {
                Ok(result) => info!(status = ?result.status(), "session closed"),
                Err(e) => warn!(error = %e, "failed to close session"),
            }
            Ok(RunSummary {
                authenticated: true,
                query: outcome?,
            })
        }
        Credentials::Basic { username, password } => {
            if config.project_id.is_some() {
                warn!("project id is only applied with token authentication, ignoring it");
            }
            let ctx = client
                .authenticate_basic_token(&ctx, username, password)
                .await?;
            info!(user = %username, "authenticated with basic credentials");
            let query = run_query(config, client, &ctx, out).await?;
            Ok(RunSummary {
                authenticated: true,
                query,
            })
        }
    }
}

/// Sets `project_id` on the server-side session.
pub async fn set_session_options<C>(
    client: &mut C,
    ctx: &CallContext,
    project_id: &str,
) -> Result<()>
where
    C: FlightClient + ?Sized,
{
    let result = client
        .set_session_options(ctx, SetSessionOptionsRequest::project(project_id))
        .await?;
    result.into_result()?;
    info!(project_id = %project_id, "session options set");
    Ok(())
}

async fn run_query<C, W>(
    config: &FlightConfig,
    client: &mut C,
    ctx: &CallContext,
    out: W,
) -> Result<Option<QueryStats>>
where
    C: FlightClient + ?Sized,
    W: Write + Send,
{
    let Some(query) = config.query.as_deref() else {
        info!("no query given, done");
        return Ok(None);
    };
    let mut printer =
        ResultPrinter::new(out, config.output.format).with_save_to(config.output.save_to.clone());

    let schema = client.get_schema(ctx, descriptor_for_query(query)).await?;
    info!(fields = schema.fields().len(), "received schema");
    printer.write_schema(&schema)?;

    let flight_info = client
        .get_flight_info(ctx, descriptor_for_query(query))
        .await?;
    let ticket = first_ticket(&flight_info)?;
    debug!(
        endpoints = flight_info.endpoint.len(),
        ticket_len = ticket.ticket.len(),
        "received flight info"
    );

    let mut batches = client.do_get(ctx, ticket).await?;
    if let Err(e) = drain(&mut batches, &mut printer).await {
        printer.abort();
        return Err(e);
    }
    let stats = printer.finish()?;
    info!(batches = stats.batches, rows = stats.rows, "query complete");
    Ok(Some(stats))
}

async fn drain<W: Write>(
    batches: &mut BatchStream,
    printer: &mut ResultPrinter<W>,
) -> Result<()> {
    while let Some(batch) = batches.try_next().await? {
        debug!(rows = batch.num_rows(), "received record batch");
        printer.write_batch(&batch)?;
    }
    Ok(())
}
