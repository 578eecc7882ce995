// ABOUTME: Gateway server binary: loads configuration, wires resources, serves HTTP
// ABOUTME: Token encryption key comes from the environment or is generated with a warning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Vizgate Contributors

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use vizgate::config::ServerConfig;
use vizgate::context::ServerResources;
use vizgate::crypto::SecretCipher;
use vizgate::logging::LoggingConfig;
use vizgate::mcp::NoopToolDispatcher;
use vizgate::store::factory::StoreFactory;
use vizgate::upstream::RestUpstreamClient;
use vizgate::{constants::protocol, server};

#[derive(Parser)]
#[command(
    name = "vizgate",
    about = "OAuth 2.1 gateway fronting an analytics platform with an MCP surface",
    version
)]
struct Args {
    /// HTTP port override (otherwise VIZGATE_HTTP_PORT or the default)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    LoggingConfig::from_env().init()?;
    info!(
        "Starting {} v{}",
        protocol::SERVER_NAME,
        protocol::SERVER_VERSION
    );

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let token_cipher = SecretCipher::load_or_generate("VIZGATE_TOKEN_ENCRYPTION_KEY")?;
    let upstream = Arc::new(RestUpstreamClient::new(config.upstream.clone())?);

    let factory = StoreFactory::new();
    let resources = ServerResources::assemble(
        config,
        token_cipher,
        upstream,
        Arc::new(NoopToolDispatcher),
        &factory,
    )
    .await?;

    server::run(Arc::new(resources)).await?;
    Ok(())
}
