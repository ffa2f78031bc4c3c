use std::path::PathBuf;

use atrium::{App, BindConfig, static_content, tracing_setup};
use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// TCP port to listen on
    #[clap(short, long, default_value_t = 8080)]
    port: u16,

    /// IP address to bind
    #[clap(short, long, default_value = "0.0.0.0")]
    address: String,

    /// Listen backlog
    #[clap(long, default_value_t = 511)]
    backlog: u32,

    /// Serve this directory under /assets
    #[clap(long)]
    static_dir: Option<PathBuf>,

    /// Emit JSON logs instead of console output
    #[clap(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    if args.json_logs {
        tracing_setup::init_tracing()?;
    } else {
        tracing_setup::init_console_tracing()?;
    }

    let mut app = App::new(BindConfig {
        port: args.port,
        address: args.address,
        backlog: args.backlog,
    });

    app.enable_json_body();

    if let Some(static_dir) = args.static_dir {
        tracing::info!("Serving static content from {}", static_dir.display());
        app.nest_service("/assets", static_content(static_dir));
    }

    app.on_ready(|| tracing::info!("Front end ready"));
    app.on_request(|req| {
        tracing::info!(
            remote_ip = %req.remote_ip,
            method = %req.method,
            url = %req.url,
            "Inbound request"
        );
    });
    app.on_error(|description| tracing::error!("Application error: {}", description));

    app.start().await.wrap_err("Failed to start front end")?;

    if let Some(addr) = app.local_addr() {
        println!("Atrium front end listening on {addr}");
    }

    // Park until interrupted; in-flight requests are not drained.
    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for shutdown signal")?;

    Ok(())
}
