use anyhow::Context;
use stockroom_infra::StockroomConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockroom_observability::init();

    let config = StockroomConfig::from_env().context("invalid configuration")?;
    if config.admin_token.is_none() {
        tracing::warn!("STOCKROOM_ADMIN_TOKEN not set; admin routes are unauthenticated");
    }
    let bind = config.bind;

    let app = stockroom_api::app::build_app(config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
