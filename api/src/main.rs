use anyhow::Context;
use notes_api::build_router;
use notes_rag::{NotesService, RagConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RagConfig::from_env().context("invalid configuration")?;
    let address = format!("{}:{}", config.host, config.port);

    let service = NotesService::from_config(config)
        .await
        .context("failed to initialise the notes service")?;
    let app = build_router(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
