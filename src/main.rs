use clap::Parser;
use dotenvy::dotenv;
use pdf2epub_mailer::config::AppConfig;
use pdf2epub_mailer::services::converter::ExternalConverter;
use pdf2epub_mailer::services::mailer::MailDispatcher;
use pdf2epub_mailer::services::pipeline::ConversionPipeline;
use pdf2epub_mailer::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf2epub_mailer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting pdf2epub mailer...");

    let mut config = AppConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    if config.uses_default_token() {
        warn!("⚠️  BEARER_TOKEN is the default placeholder; set a real secret");
    }
    info!(
        "📄 Converter: {} (timeout: {:?}), Max Size={}MB, Recipient={}",
        config.converter.bin,
        config.converter.timeout,
        config.max_upload_bytes / 1024 / 1024,
        config.recipient
    );

    let converter = Arc::new(ExternalConverter::from_config(&config.converter));
    let mailer = MailDispatcher::from_config(&config.smtp)?;
    let pipeline = Arc::new(ConversionPipeline::new(&config, converter, mailer));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState {
        pipeline,
        config: Arc::new(config),
    };
    let app = create_app(state);

    info!("✅ Server ready at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
