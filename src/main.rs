// Social API Server

use tokio::net::TcpListener;
use tracing::info;

use social_api::{
    api::create_router, app_state::AppState, config::Config,
    infrastructure::monitoring::initialize_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    initialize_tracing();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;
    let app = create_router(app_state);

    // Start server
    let addr = config.server_address();
    let listener = TcpListener::bind(addr.as_str()).await?;
    info!("Social API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
