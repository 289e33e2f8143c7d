use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// UnrealScript Debug Adapter Protocol server.
///
/// Speaks DAP over stdio by default and connects to the debugger interface
/// library loaded inside the game. `--listen` serves DAP over a TCP port
/// instead, which is handy when the adapter itself is being debugged.
#[derive(Debug, Parser)]
#[command(name = "uscript-dap", version, about)]
struct Cli {
    /// Listen for one DAP client on this address (e.g. 127.0.0.1:9444)
    /// instead of using stdio.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout belongs to the DAP client; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.listen {
        None => uscript_dap::server::run_stdio().await,
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("bind {addr}"))?;
            eprintln!("listening on {}", listener.local_addr()?);

            let (stream, peer) = listener.accept().await.context("accept DAP client")?;
            tracing::info!(target: "uscript.dap", %peer, "DAP client connected");
            stream.set_nodelay(true).ok();

            let (reader, writer) = stream.into_split();
            uscript_dap::server::run(reader, writer)
                .await
                .map_err(anyhow::Error::from)
        }
    }
}
