#[tokio::main]
async fn main() {
    if let Err(err) = nextgen_mcp::mcp::server::run_stdio().await {
        eprintln!("nextgen-mcp: {}", err);
        std::process::exit(1);
    }
}
