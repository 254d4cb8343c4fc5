//! vpsmon probe: serves live system metrics to the dashboard over a
//! WebSocket push feed.

mod metrics;
mod net;
mod state;
mod types;
mod ws;

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tracing::info;
use tracing_subscriber::EnvFilter;

use state::AppState;

const DEFAULT_PORT: u16 = 9000;

fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut port: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" | "-p" => port = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    port = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    port.and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let default_port = std::env::var("VPSMON_AGENT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let port = parse_port(std::env::args(), default_port);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(AppState::new());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "vpsmon probe listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_port;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("vpsmon_agent")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(parse_port(args(&["--port", "9001"]), 9000), 9001);
        assert_eq!(parse_port(args(&["-p", "9002"]), 9000), 9002);
        assert_eq!(parse_port(args(&["--port=9003"]), 9000), 9003);
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(parse_port(args(&[]), 9000), 9000);
        assert_eq!(parse_port(args(&["--port", "not-a-port"]), 9000), 9000);
    }
}
