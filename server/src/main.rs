use clap::Parser;
use log::info;
use rand::Rng;
use server::network::{Server, ServerConfig};
use server::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, generates the server and admin ids, then runs the server
/// until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, env = "PORT", default_value = "80")]
        port: u16,
        /// Id clients must send in their Init message (random if unset)
        #[clap(long, env = "SERVER_ID")]
        server_id: Option<String>,
        /// Token authorizing moderator commands (random if unset)
        #[clap(long, env = "ADMIN_TOKEN")]
        admin_token: Option<String>,
        /// Seconds without outbound traffic before a ping is sent
        #[clap(long, default_value = "30")]
        keepalive_secs: u64,
        /// Seconds a new connection has to send its Init message
        #[clap(long, default_value = "2")]
        init_timeout_secs: u64,
        /// Pending messages kept per player before the oldest are dropped
        #[clap(long, default_value = "20")]
        queue_capacity: usize,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = Args::parse();

    let (server_id, admin_token) = {
        let mut rng = rand::thread_rng();
        let server_id = args
            .server_id
            .unwrap_or_else(|| rng.gen_range(0..999_999).to_string());
        let admin_token = args
            .admin_token
            .unwrap_or_else(|| rng.gen_range(0..999_999).to_string());
        (server_id, admin_token)
    };

    info!("Game Server Id = {}", server_id);
    info!("Admin Server Id = {}", admin_token);

    let config = ServerConfig {
        keepalive: Duration::from_secs(args.keepalive_secs),
        init_timeout: Duration::from_secs(args.init_timeout_secs),
        queue_capacity: args.queue_capacity,
    };

    let registry = Arc::new(SessionRegistry::new(
        server_id,
        admin_token,
        config.queue_capacity,
    ));

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, registry, config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
