#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coalesce_observability::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|raw| match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!("PORT={raw:?} is not a valid port; using 3000");
                None
            }
        })
        .unwrap_or(3000);

    let app = coalesce_api::app::build_app().await;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
