use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process.
///
/// Tests build many apps in one process, so a second call hands back the
/// existing handle. If another recorder is already installed we fall back to
/// a detached one; `/metrics` then renders empty instead of failing startup.
pub fn init() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_all();
                handle
            }
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder not installed; /metrics will be empty");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

fn describe_all() {
    describe_counter!("newsletter_generations_total", "Generation requests accepted");
    describe_counter!("newsletter_generation_errors_total", "Generations ending in an error event");
    describe_counter!("newsletter_generation_cancelled_total", "Generations stopped by client disconnect");
    describe_counter!("newsletter_partials_total", "Partial snapshots emitted");
    describe_histogram!("newsletter_generation_ms", "Wall time per generation");
    describe_counter!("feeds_refreshed_total", "Feeds refreshed successfully");
    describe_counter!("feeds_refresh_errors_total", "Feed refresh failures");
    describe_counter!("feeds_stale_total", "Feeds found stale at request time");
    describe_counter!("feeds_staleness_lookup_errors_total", "Staleness lookups that failed");
    describe_histogram!("feeds_refresh_ms", "Wall time per refresh batch");
    describe_counter!("feeds_items_parsed_total", "RSS items parsed");
    describe_histogram!("feeds_parse_ms", "RSS parse time");
}

/// Router exposing `/metrics` in the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
