// src/handlers/admin.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde_json::json;

use super::SiteContext;
use crate::models::{NewsDraft, ServerStatusPatch, SiteSettingsPatch};
use crate::session::SessionId;
use crate::utils::{session_id, ApiError};

fn require_admin(req: &HttpRequest, context: &SiteContext) -> Result<SessionId, ApiError> {
    match session_id(req) {
        Some(id) if context.is_authenticated(&id) => Ok(id),
        _ => {
            debug!("Rejected admin request to {}", req.path());
            Err(ApiError::Unauthorized)
        }
    }
}

pub async fn get_contacts(
    req: HttpRequest,
    context: web::Data<SiteContext>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let contacts = context.contacts();
    Ok(HttpResponse::Ok().json(json!({
        "total": contacts.len(),
        "unread": context.unread_contacts(),
        "contacts": contacts,
    })))
}

pub async fn mark_contact_read(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    context.mark_contact_as_read(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn delete_contact(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let id = path.into_inner();
    context.delete_contact(id).await?;
    info!("Deleted contact {}", id);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn add_news(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    body: web::Json<NewsDraft>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let post = context.add_news(body.into_inner()).await?;
    info!("Published news post {}: {}", post.id, post.title);
    Ok(HttpResponse::Created().json(post))
}

pub async fn update_news(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    path: web::Path<i64>,
    body: web::Json<NewsDraft>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let post = context.update_news(path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn delete_news(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let id = path.into_inner();
    context.delete_news(id).await?;
    info!("Deleted news post {}", id);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn update_status(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    body: web::Json<ServerStatusPatch>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let status = context.update_server_status(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn update_settings(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    body: web::Json<SiteSettingsPatch>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &context)?;
    let settings = context.update_site_settings(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}
