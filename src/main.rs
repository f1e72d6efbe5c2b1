use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use solo::config::Cli;
use solo::page::IndexPage;
use solo::{Router, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "solo=info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let page = Arc::new(IndexPage::load(&cli.path)?);

    let mut router = Router::new();
    router.get("/", move |ctx, res| {
        info!(method = ctx.request().method(), path = ctx.request().path(), "rendering index");
        res.body(page.render());
    });

    let handle = Server::new(cli.server_config(), router).start().await?;
    info!(port = handle.port(), "start server...");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.stop().await?;
    Ok(())
}
