use snapboard_api::setup::{initialize_app, server::start_server};
use snapboard_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let (state, app) = initialize_app(config).await?;

    start_server(&state.config, app).await
}
