use std::process;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use taskdeck::{rate_limit::RateLimit, routes, AppState, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Panics are fatal
    std::panic::set_hook(Box::new(|info| {
        log::error!("Fatal error, shutting down: {}", info);
        process::exit(1);
    }));

    let config = Config::from_env().unwrap_or_else(|e| {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    });
    let state = AppState::from_config(&config).await.unwrap_or_else(|e| {
        log::error!("Failed to initialise application state: {}", e);
        process::exit(1);
    });
    let state = web::Data::new(state);

    log::info!("Starting taskdeck server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(RateLimit::global())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
