//! Entry point for the vpsmon dashboard server. Parses args, opens and
//! migrates the database, spawns the connection manager, and serves the API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vpsmon::conn::WsDialer;
use vpsmon::db::Db;
use vpsmon::http::{self, ApiState};
use vpsmon::manager::Manager;

struct Config {
    port: u16,
    bind: String,
    db_path: String,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Config, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "vpsmon".into());
    let usage = format!("Usage: {prog} [--port N|-p N] [--bind ADDR] [--db PATH]");

    let mut port: Option<String> = std::env::var("VPSMON_PORT").ok();
    let mut bind = std::env::var("VPSMON_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let mut db_path = std::env::var("VPSMON_DB").unwrap_or_else(|_| "vpsmon.db".into());

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage),
            "--port" | "-p" => port = it.next(),
            "--bind" => {
                if let Some(v) = it.next() {
                    bind = v;
                }
            }
            "--db" => {
                if let Some(v) = it.next() {
                    db_path = v;
                }
            }
            _ if arg.starts_with("--port=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    port = Some(v.to_string());
                }
            }
            _ if arg.starts_with("--db=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    db_path = v.to_string();
                }
            }
            _ => return Err(usage),
        }
    }

    let port = match port {
        Some(s) => s.parse::<u16>().map_err(|_| usage)?,
        None => 8080,
    };
    Ok(Config {
        port,
        bind,
        db_path,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = match parse_args(std::env::args()) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let db = Db::open(&cfg.db_path)
        .await
        .with_context(|| format!("open database {}", cfg.db_path))?;
    db.migrate().await.context("run migrations")?;

    let manager = Manager::spawn(Arc::new(WsDialer));
    // Bring up connections for everything already configured.
    manager.reconcile(db.all_endpoints().await?);

    let state = ApiState {
        db,
        manager: manager.clone(),
    };
    let app = http::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .with_context(|| format!("bad bind address {}:{}", cfg.bind, cfg.port))?;
    info!(%addr, "vpsmon dashboard listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Close every probe connection before exiting.
    manager.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    fn args(v: &[&str]) -> Vec<String> {
        std::iter::once("vpsmon")
            .chain(v.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults() {
        let c = parse_args(args(&[])).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.bind, "0.0.0.0");
        assert_eq!(c.db_path, "vpsmon.db");
    }

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(parse_args(args(&["--port", "9001"])).unwrap().port, 9001);
        assert_eq!(parse_args(args(&["-p", "9002"])).unwrap().port, 9002);
        assert_eq!(parse_args(args(&["--port=9003"])).unwrap().port, 9003);
    }

    #[test]
    fn db_and_bind_flags() {
        let c = parse_args(args(&["--db", "/tmp/x.db", "--bind", "127.0.0.1"])).unwrap();
        assert_eq!(c.db_path, "/tmp/x.db");
        assert_eq!(c.bind, "127.0.0.1");
    }

    #[test]
    fn rejects_unknown_flag_and_bad_port() {
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--port", "not-a-port"])).is_err());
    }
}
