// Standalone fixture site for trying the scanner by hand

use std::net::SocketAddr;
use tracing::{Level, info};

include!("../../tests/test_server_app.rs");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let app = create_app().await;

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Fixture server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Fixture server failed: {}", e);
        std::process::exit(1);
    }
}
