use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;

use gym_billing::{
    config::Config,
    handlers,
    services::{auth::TokenAuthenticator, gateway::HttpGateway, store, BillingServices},
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let store = store::connect(&config.database_url)
        .await
        .context("Failed to initialize billing store")?;
    let gateway = HttpGateway::new(&config.gateway).context("Failed to build gateway client")?;
    let authenticator =
        TokenAuthenticator::parse(&config.auth_tokens).context("Failed to load AUTH_TOKENS")?;

    let services = BillingServices::build(&config, store, Arc::new(gateway), Arc::new(authenticator));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!(
        "Starting gym billing server on {} ({:?})",
        bind_address,
        config.app.environment
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .configure(|cfg| handlers::configure(cfg, &services))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
