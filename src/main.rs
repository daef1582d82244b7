#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists; variables already set win.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    identityd::cli::run_cli().await
}
