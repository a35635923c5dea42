// src/handlers/index.rs
use actix_web::{web, HttpResponse};
use serde_json::json;

use super::SiteContext;
use crate::utils::ApiError;

pub async fn index(context: web::Data<SiteContext>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "loading": context.is_loading(),
    })))
}
