// src/handlers/site.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error};
use serde::Serialize;

use super::{ContactLimiter, SiteContext};
use crate::models::{NewContact, NewsPost, ServerStatus, SiteSettings};
use crate::utils::{extract_client_ip, ApiError};

/// Everything the public pages render: header, footer, status card and news feed.
#[derive(Serialize)]
pub struct SitePayload {
    pub settings: SiteSettings,
    pub status: ServerStatus,
    pub news: Vec<NewsPost>,
    pub loading: bool,
}

pub async fn get_site(context: web::Data<SiteContext>) -> Result<HttpResponse, ApiError> {
    let snapshot = context.snapshot();
    Ok(HttpResponse::Ok().json(SitePayload {
        settings: snapshot.site_settings,
        status: snapshot.server_status,
        news: snapshot.news,
        loading: snapshot.loading,
    }))
}

pub async fn get_news(context: web::Data<SiteContext>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(context.news()))
}

pub async fn get_news_post(
    context: web::Data<SiteContext>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match context.news_post(id) {
        Some(post) => Ok(HttpResponse::Ok().json(post)),
        None => {
            debug!("News post {} not found", id);
            Err(ApiError::NotFound)
        }
    }
}

pub async fn get_status(context: web::Data<SiteContext>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(context.server_status()))
}

pub async fn get_settings(context: web::Data<SiteContext>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(context.site_settings()))
}

pub async fn submit_contact(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    limiter: web::Data<ContactLimiter>,
    body: web::Json<NewContact>,
) -> Result<HttpResponse, ApiError> {
    let client_ip = extract_client_ip(&req, &limiter.trusted_proxies)?;

    if limiter.limiter.check_key(&client_ip).is_err() {
        error!("Rate limit exceeded for contact form for ip: {}", client_ip);
        return Err(ApiError::RateLimitExceeded);
    }

    let message = context.submit_contact(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": message.id })))
}
