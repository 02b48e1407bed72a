//! h1-engine demo binary.
//!
//! ```text
//! h1-engine serve [--config engine.toml] [--bind 127.0.0.1:8080]
//!     GET  /            → "Hello World!"
//!     POST /echo        → request body echoed back
//!     POST /upload      → streamed upload (raw or multipart), answers with the byte count
//!     GET  /stats       → session pool counters as JSON
//!     mounts from [server.mounts]
//!
//! h1-engine get <url> [--follow] [--compress]
//!     prints status line, headers and body
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use url::Url;

use h1_engine::config::{load_config, EngineConfig};
use h1_engine::http::{mime, Client, MultipartEvent, Server};
use h1_engine::lifecycle::{signals, Shutdown};
use h1_engine::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "h1-engine")]
#[command(about = "Async HTTP/1.1 server and client engine", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo server
    Serve {
        /// Override `server.bind_address`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Issue a single request and print the response
    Get {
        url: String,
        /// Follow redirects
        #[arg(long)]
        follow: bool,
        /// Ask for and decode gzip/deflate bodies
        #[arg(long)]
        compress: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    logging::init_logging(&config.observability.log_level);

    let result = match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Get { url, follow, compress } => get(&config, &url, follow, compress).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(mut config: EngineConfig, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.server.bind_address,
        max_connections = config.server.max_connections,
        reactors = config.server.reactors,
        "h1-engine starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut server = Server::new(config.server);
    let pool = server.pool_handle();
    server
        .get("/", |_, res| res.set_content("Hello World!", mime::TEXT_PLAIN))
        .post("/echo", |req, res| {
            let content_type = req.header_value("Content-Type").unwrap_or(mime::APPLICATION_OCTET_STREAM);
            res.set_content(req.body.clone(), content_type);
        })
        .post_with_reader("/upload", |_req, res, mut reader| {
            Box::pin(async move {
                let mut received = 0u64;
                let mut parts = 0usize;
                let result = if reader.is_multipart() {
                    reader
                        .read_multipart(|event| {
                            match event {
                                MultipartEvent::Part(part) => {
                                    parts += 1;
                                    tracing::debug!(name = %part.name, filename = %part.filename, "Upload part");
                                }
                                MultipartEvent::Content(data) => received += data.len() as u64,
                            }
                            true
                        })
                        .await
                } else {
                    reader
                        .read(|data: &[u8]| {
                            received += data.len() as u64;
                            true
                        })
                        .await
                };
                match result {
                    Ok(()) if parts > 0 => res.set_content(format!("{} parts, {} bytes\n", parts, received), mime::TEXT_PLAIN),
                    Ok(()) => res.set_content(format!("{}\n", received), mime::TEXT_PLAIN),
                    Err(e) => tracing::warn!(error = %e, received, "Upload aborted"),
                }
            })
        })
        .get("/stats", move |_, res| match serde_json::to_string(&pool.stats()) {
            Ok(json) => res.set_content(json, mime::APPLICATION_JSON),
            Err(e) => tracing::error!(error = %e, "Failed to encode pool stats"),
        });

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::install(shutdown);

    server.listen(shutdown_rx).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn get(config: &EngineConfig, target: &str, follow: bool, compress: bool) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(target)?;
    let origin = url.origin().ascii_serialization();
    let path = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };

    let mut client = Client::with_config(&origin, &config.client)?;
    client.set_follow_location(follow || config.client.follow_location);
    client.set_compress(compress || config.client.compress);

    let res = client.get(&path).await?;
    println!("{} {} {}", res.version, res.status.as_u16(), res.reason_phrase());
    for (name, value) in res.headers.iter() {
        println!("{}: {}", name, value);
    }
    println!();
    println!("{}", res.text());
    Ok(())
}
