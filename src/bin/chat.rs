use chat_interview::client::terminal;
use chat_interview::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    eprintln!("Connecting to {} (/retry to re-ask, /quit to leave)", config.server_url);
    terminal::run(config).await
}
