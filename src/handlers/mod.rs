// src/handlers/mod.rs
pub mod admin;
pub mod auth;
pub mod hooks;
pub mod index;
pub mod site;

use actix_web::web;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::net::IpAddr;

use crate::context::DataContext;
use crate::storage::Backend;
use crate::utils::TrustedProxies;

pub type SiteContext = DataContext<Backend>;

pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Rate limiter guarding the public contact form, keyed by client address.
pub struct ContactLimiter {
    pub limiter: IpRateLimiter,
    pub trusted_proxies: TrustedProxies,
}

impl ContactLimiter {
    pub fn new(quota: Quota, trusted_proxies: TrustedProxies) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota),
            trusted_proxies,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index::index))
        .service(
            web::scope("/api")
                .route("/site", web::get().to(site::get_site))
                .route("/news", web::get().to(site::get_news))
                .route("/news/{id}", web::get().to(site::get_news_post))
                .route("/status", web::get().to(site::get_status))
                .route("/settings", web::get().to(site::get_settings))
                .route("/contact", web::post().to(site::submit_contact)),
        )
        .service(
            web::scope("/admin")
                .route("/login", web::post().to(auth::login))
                .route("/logout", web::post().to(auth::logout))
                .route("/session", web::get().to(auth::session))
                .route("/contacts", web::get().to(admin::get_contacts))
                .route("/contacts/{id}/read", web::post().to(admin::mark_contact_read))
                .route("/contacts/{id}", web::delete().to(admin::delete_contact))
                .route("/news", web::post().to(admin::add_news))
                .route("/news/{id}", web::put().to(admin::update_news))
                .route("/news/{id}", web::delete().to(admin::delete_news))
                .route("/status", web::put().to(admin::update_status))
                .route("/settings", web::put().to(admin::update_settings)),
        )
        .route("/hooks/changes", web::post().to(hooks::handle_change));
}
