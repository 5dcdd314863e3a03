use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;

use payment_ledger_server::app_state::{
    notifier_from_settings, retry_from_settings, AppState, LedgerStores, ProviderApis,
};
use payment_ledger_server::config;
use payment_ledger_server::db::{create_pool, run_migrations, verify_connection};
use payment_ledger_server::routes;
use payment_ledger_server::services::yearly_allocation_job::start_yearly_allocation_job;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load application settings
    let app_settings = match config::init_config() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load application settings: {}", e);
            log::error!("Cannot start server without valid settings");
            std::process::exit(1);
        }
    };

    // Database connection setup
    let db_pool = match create_pool(&app_settings.database).await {
        Ok(pool) => {
            if let Err(e) = verify_connection(&pool).await {
                log::error!("Database connection verification failed: {}", e);
                log::error!("Cannot start server without a working database connection");
                std::process::exit(1);
            }
            log::info!("Database connection established successfully");
            pool
        }
        Err(e) => {
            log::error!("Failed to create database connection pool: {}", e);
            log::error!("Cannot start server without a working database connection");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&db_pool).await {
        log::error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }

    let stores = LedgerStores::postgres(db_pool);
    let notifier = notifier_from_settings(&app_settings, stores.users.clone());
    let app_state = web::Data::new(AppState::build(
        &app_settings,
        stores,
        ProviderApis::from_settings(&app_settings),
        notifier,
        retry_from_settings(&app_settings),
    ));

    if app_state.stripe.is_none() && app_state.creem.is_none() {
        log::warn!("No payment provider is configured; webhooks will be rejected");
    }

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match start_yearly_allocation_job(
        app_state.credits.clone(),
        &app_settings.billing.yearly_allocation_cron,
    )
    .await
    {
        Ok(scheduler) => Some(scheduler),
        Err(e) => {
            log::error!("Failed to start yearly allocation job: {:#}", e);
            None
        }
    };

    let server_addr = format!("{}:{}", app_settings.server.host, app_settings.server.port);
    log::info!("Starting {} on {}", app_settings.app.name, server_addr);

    let listener = TcpListener::bind(&server_addr)?;
    let settings_data = web::Data::new(app_settings.clone());

    HttpServer::new(move || {
        // Configure CORS using actix-cors
        let mut cors = Cors::default().supports_credentials();

        if app_settings.server.cors_origins.contains(&"*".to_string()) {
            cors = cors.allow_any_origin();
        } else {
            for origin in &app_settings.server.cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }

        cors = cors.allow_any_method().allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(settings_data.clone())
            .app_data(app_state.clone())
            .configure(routes::configure_app)
    })
    .listen(listener)?
    .run()
    .await
}
