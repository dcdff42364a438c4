use voice_configuration::{load_config, setup_logging};
use voice_setup::build_and_run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = load_config()?;
    setup_logging(&config.logging)?;
    config.validate_all()?;

    build_and_run(config).await
}
