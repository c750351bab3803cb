use std::process::ExitCode;

use dotenvy::dotenv;
use log::{error, info};
use payment_notify_server::{cli::handle_command_line_args, config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return ExitCode::SUCCESS;
    }
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Listening for payment notifications on {}:{}", config.host, config.port);
    if let Err(e) = run_server(config).await {
        error!("🚀️ Server stopped with an error. {e}");
        return ExitCode::FAILURE;
    }
    info!("🚀️ Server shut down cleanly");
    ExitCode::SUCCESS
}
