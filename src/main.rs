// src/main.rs
mod config;
mod context;
mod handlers;
mod models;
mod session;
mod storage;
mod utils;

use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{info, warn};
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::context::DataContext;
use crate::handlers::hooks::WebhookSecret;
use crate::handlers::ContactLimiter;
use crate::storage::memory::MemoryStore;
use crate::storage::rest::RestStore;
use crate::storage::Backend;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger only once at the start
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();

    let backend = match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            Backend::Memory(MemoryStore::new())
        }
        StoreBackend::Supabase => {
            let endpoint = config.endpoint();
            if endpoint.is_none() {
                warn!("SUPABASE_URL/SUPABASE_ANON_KEY not set, serving bundled defaults");
            }
            let store = RestStore::new(endpoint, config.request_timeout()).map_err(|e| {
                log::error!("Failed to build the database client: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            Backend::Rest(store)
        }
    };

    let context = Arc::new(
        DataContext::new(backend, config.credentials())
            .with_session_max_age(config.session_max_age()),
    );
    context.load_all().await;
    context.start_subscriptions();

    let site = web::Data::from(context.clone());
    let contact_limiter = web::Data::new(ContactLimiter::new(
        config.contact_quota(),
        config.trusted_proxies(),
    ));
    let webhook_secret = web::Data::new(WebhookSecret(config.webhook_secret.clone()));

    let bind = config.bind();
    info!("Starting server on {}", bind);
    let result = HttpServer::new(move || {
        App::new()
            .app_data(site.clone())
            .app_data(contact_limiter.clone())
            .app_data(webhook_secret.clone())
            .configure(handlers::configure)
    })
        .bind(&bind)?
        .run().await;

    context.dispose();
    info!("Server stopped");
    result
}
