use convoy::cli::Cli;

#[tokio::main]
async fn main() {
    match Cli::run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(2);
        }
    }
}
