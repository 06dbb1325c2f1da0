use dotenv::dotenv;
use log::{info, warn};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use dividend_dashboard_api::routes::{routes, AppContext};
use dividend_dashboard_api::services::auth::{secret_key, InMemoryUserRepository, UserRepository};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let port_str = env::var("PORT").unwrap_or_else(|_| {
        warn!("$PORT not set, defaulting to 8000");
        "8000".to_string()
    });

    let port: u16 = port_str.parse().expect("PORT must be a number");
    info!("Using PORT: {}", port);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!("Will bind to: {}", addr);

    // Mock user store seeded with the demo account. Swap this Arc for a
    // database-backed repository to run against real accounts.
    let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::with_demo_user());
    let ctx = AppContext::new(users, secret_key());

    // Set up CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_header("authorization")
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

    // Set up routes
    let api = routes(ctx).with(cors);
    info!("Routes configured successfully with CORS.");

    // Start the server
    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
}
