use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use chart_core::{constants::DEFAULT_CHART_DATA_DIR, ChartSettings, CoreConfig};

/// Main entry point for the patient chart service
///
/// Resolves configuration once, then serves the REST API (with OpenAPI/Swagger UI).
///
/// # Environment Variables
/// - `CHART_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CHART_DATA_DIR`: Directory for chart data storage (default: "chart_data")
/// - `CHART_CONFIG`: Optional YAML file with vaccine, sequence and vitals range settings
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the chart settings cannot be read or are invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chart_run=info".parse()?)
                .add_directive("chart_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CHART_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = Arc::new(resolve_config()?);

    tracing::info!("++ Chart data directory: {}", cfg.chart_data_dir().display());
    tracing::info!("++ Starting chart REST on {}", rest_addr);

    let app = router(AppState::new(cfg));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn resolve_config() -> anyhow::Result<CoreConfig> {
    let data_dir = std::env::var("CHART_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CHART_DATA_DIR));

    let settings_path = std::env::var("CHART_CONFIG").ok().map(PathBuf::from);
    if let Some(path) = &settings_path {
        tracing::info!("++ Loading chart settings from {}", path.display());
    }
    let settings = ChartSettings::load(settings_path.as_deref())?;

    Ok(CoreConfig::new(data_dir, settings)?)
}
