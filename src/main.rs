use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use exchange_engine::{
    config::Config,
    database::Database,
    events::NatsProducer,
    forecast_client::ForecastClient,
    handlers,
    identity_client::IdentityClient,
    market_client::MarketDataClient,
    middleware::RateLimiter,
    services::ExchangeService,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize tracing
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .json()
        .init();

    info!("Starting Exchange Engine...");

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Configuration loaded successfully");

    // Initialize database (runs embedded migrations)
    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );

    info!("Database connected successfully");

    // Initialize NATS
    let nats = Arc::new(
        NatsProducer::new(&config.nats.url, &config.nats.topic_prefix)
            .await
            .expect("Failed to create NATS producer"),
    );

    info!("NATS producer initialized successfully");

    // Initialize external collaborator clients
    let identity = Arc::new(IdentityClient::new(
        config.identity.base_url.clone(),
        config.identity.timeout_secs,
    ));
    let market_data = Arc::new(MarketDataClient::new(
        config.market_data.base_url.clone(),
        config.market_data.timeout_secs,
    ));
    let forecast = Arc::new(ForecastClient::new(
        config.forecast.base_url.clone(),
        config.forecast.timeout_secs,
    ));

    info!("Collaborator clients initialized");

    // Initialize service
    let service = Arc::new(ExchangeService::new(
        db,
        nats,
        identity,
        market_data,
        forecast,
        config.exchange.rate_window_hours,
        config.exchange.max_rate_window_hours,
        config.exchange.default_margin_percent,
    ));

    info!("Exchange service initialized successfully");

    // Start HTTP server
    let server_config = config.server.clone();
    let requests_per_minute = server_config.requests_per_minute;
    let service_data = web::Data::new(service);

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(service_data.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .wrap(RateLimiter::new(requests_per_minute))
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await
}
