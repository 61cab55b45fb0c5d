//! Optional OTLP trace export
//!
//! Compiled in behind the `telemetry` cargo feature and activated at
//! runtime only when an exporter endpoint is configured, so default builds
//! and local runs stay plain-logging only.

use anyhow::Result;

/// Wire an OTLP span exporter into the tracing subscriber when configured.
///
/// Reads `OTEL_EXPORTER_OTLP_ENDPOINT` and `OTEL_SERVICE_NAME` (default
/// `farmhand`). Without the endpoint variable this is a no-op.
pub fn init_telemetry() -> Result<()> {
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        tracing::debug!("No OTLP endpoint configured; traces stay local");
        return Ok(());
    };

    #[cfg(feature = "telemetry")]
    {
        export_traces_to(&endpoint)?;
    }

    #[cfg(not(feature = "telemetry"))]
    tracing::warn!(
        endpoint = %endpoint,
        "OTLP endpoint is set but this binary was built without the 'telemetry' feature; ignoring it"
    );

    Ok(())
}

#[cfg(feature = "telemetry")]
fn export_traces_to(endpoint: &str) -> Result<()> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use tracing_subscriber::layer::SubscriberExt;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "farmhand".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();

    let layer =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.clone()));
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer))?;

    tracing::info!(
        service_name = %service_name,
        endpoint,
        "Exporting traces over OTLP"
    );
    Ok(())
}
