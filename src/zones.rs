//! Per-zone iteration

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::error::{CliError, SdkResultExt};
use crate::sdk::ComputeApi;
use crate::state::Context;

/// What a per-zone callback gets: the zone, a client bound to it and the
/// result channel.
pub struct ZoneScope<T> {
    pub zone: String,
    pub client: Arc<dyn ComputeApi>,
    results: UnboundedSender<T>,
}

impl<T> ZoneScope<T> {
    pub fn send(&self, item: T) {
        // The collector outlives every callback.
        let _ = self.results.send(item);
    }
}

/// Every zone name known to the API.
pub async fn all_zones(ctx: &Context) -> Result<Vec<String>, CliError> {
    let zones = ctx
        .call(ctx.client().list_zones())
        .await
        .sdk_context("unable to list zones")?;
    Ok(zones.into_iter().map(|z| z.name).collect())
}

/// Run `f` for every zone concurrently, sending results to `results`.
///
/// Failures are wrapped with their zone and aggregated in zone order; a
/// failure in one zone does not stop the others.
pub async fn for_each_zone<T, F, Fut>(
    ctx: &Context,
    zones: &[String],
    results: UnboundedSender<T>,
    f: F,
) -> Result<(), CliError>
where
    F: Fn(ZoneScope<T>) -> Fut,
    Fut: Future<Output = Result<(), CliError>>,
{
    let runs = zones.iter().map(|zone| {
        let results = results.clone();
        let f = &f;
        async move {
            let client = ctx.zone_client(zone).await?;
            tracing::debug!(zone = %zone, "running zone callback");
            f(ZoneScope {
                zone: zone.clone(),
                client,
                results,
            })
            .await
        }
    });

    let errors = join_all(runs)
        .await
        .into_iter()
        .zip(zones)
        .filter_map(|(result, zone)| {
            result.err().map(|source| CliError::Zone {
                zone: zone.clone(),
                source: Box::new(source),
            })
        })
        .collect();

    CliError::aggregate(errors)
}

/// [`for_each_zone`] with the collector built in.
pub async fn collect_zones<T, F, Fut>(
    ctx: &Context,
    zones: &[String],
    f: F,
) -> (Vec<T>, Result<(), CliError>)
where
    F: Fn(ZoneScope<T>) -> Fut,
    Fut: Future<Output = Result<(), CliError>>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = for_each_zone(ctx, zones, tx, f).await;

    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    (items, result)
}

/// Downgrade a per-zone failure to warnings on stderr, one line per zone.
pub fn warn_partial(ctx: &Context, err: &CliError) {
    let mut stderr = ctx.stderr();
    for failure in err.components() {
        let _ = writeln!(
            stderr,
            "warning: errors during listing, results might be incomplete: {failure}"
        );
    }
}
