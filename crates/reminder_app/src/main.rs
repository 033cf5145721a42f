use anyhow::Context;
use reminder_app::app::{run, AppConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = AppConfig::from_env()?;
    let summary = run(config).context("Failed to run reminder scheduler")?;
    println!("{summary}");
    Ok(())
}
