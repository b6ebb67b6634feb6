//! Gateway binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = portico_settings::load_settings()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = portico_gateway::metrics::install_recorder();
    portico_gateway::server::serve(&settings, metrics).await
}
