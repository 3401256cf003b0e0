use anyhow::Context;

use pipeops_api::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    pipeops_observability::init_with(&settings.log);

    let bind_address = settings.server.bind_address.clone();
    let app = pipeops_api::app::build_app(settings).await?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
