//! The main function for the Shelfmark web server

#[allow(
    clippy::print_stderr,
    reason = "Tracing is not initialized yet when startup fails"
)]
#[allow(clippy::exit, reason = "Startup failure leaves nothing to clean up")]
#[tokio::main]
async fn main() {
    if dotenvy::dotenv().is_err() {
        eprintln!("No .env file found, relying on the process environment");
    }
    if let Err(error) = server::run().await {
        eprintln!("Failed to start Shelfmark! Error: {error}");
        std::process::exit(1);
    }
}
