use tusk_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    tusk_api::telemetry::init_telemetry();

    // Initialize the application (repository, storage, services, routes)
    let (_state, router) = tusk_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    tusk_api::setup::start_server(&config, router).await?;

    Ok(())
}
