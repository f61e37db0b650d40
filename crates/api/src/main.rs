use anyhow::Context;

use netfab_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    netfab_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let store = netfab_api::app::services::connect_store(&config.store)
        .await
        .context("failed to open store")?;

    let app = netfab_api::app::build_app(store);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
