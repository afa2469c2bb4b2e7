use artsphere_proxy::{ProxyConfig, ProxyServer};
use miette::{Context, IntoDiagnostic, Result};
use std::net::SocketAddr;
use tower_http::{services::ServeDir, trace::TraceLayer};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "server=debug,artsphere_proxy=debug,info"
                    .parse()
                    .expect("valid filter")
            }),
        )
        .init();

    let config = ProxyConfig::from_env();

    let proxy = ProxyServer::builder()
        .config(config)
        .build()
        .into_diagnostic()
        .wrap_err("failed to build proxy server")?;

    // Pages (when present) sit behind the route guard; everything else 404s.
    let app = match std::env::var("STATIC_DIR").ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            tracing::info!("serving pages from {}", dir);
            proxy.router_with_pages(ServeDir::new(dir))
        }
        None => proxy.router(),
    }
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .into_diagnostic()
        .wrap_err("invalid BIND_ADDR")?;

    tracing::info!("artsphere proxy listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()
        .wrap_err("failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .into_diagnostic()
        .wrap_err("server error")?;

    Ok(())
}
