use clap::Parser;
use log::{error, info};
use server::{Server, ServerConfig};

/// Main-method of the application.
/// Parses command-line arguments, loads the room configuration and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig::from_env()?;
    let words = config.load_words()?;
    info!(
        "Rounds last {}s with {}s breaks, {} words loaded",
        config.round_duration.as_secs(),
        config.break_duration.as_secs(),
        words.len()
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config, words).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
