// src/handlers/auth.rs
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use super::SiteContext;
use crate::session::SESSION_COOKIE;
use crate::utils::{session_id, ApiError};

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// No expiry: the browser drops the cookie when its session ends.
fn session_cookie(value: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish()
}

pub async fn login(
    context: web::Data<SiteContext>,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    match context.login(&form.username, &form.password).await {
        Some(id) => {
            info!("Admin logged in");
            Ok(HttpResponse::Ok()
                .cookie(session_cookie(id.to_string()))
                .json(json!({ "authenticated": true })))
        }
        None => {
            warn!("Failed admin login attempt");
            Err(ApiError::InvalidCredentials)
        }
    }
}

pub async fn logout(
    req: HttpRequest,
    context: web::Data<SiteContext>,
) -> Result<HttpResponse, ApiError> {
    if let Some(id) = session_id(&req) {
        context.logout(&id);
    }

    let mut removal = session_cookie(String::new());
    removal.make_removal();
    Ok(HttpResponse::Ok()
        .cookie(removal)
        .json(json!({ "authenticated": false })))
}

pub async fn session(
    req: HttpRequest,
    context: web::Data<SiteContext>,
) -> Result<HttpResponse, ApiError> {
    let session = session_id(&req).and_then(|id| context.sessions().get(&id));
    Ok(HttpResponse::Ok().json(json!({
        "authenticated": session.is_some(),
        "opened_at": session.map(|s| s.opened_at),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{configure, testing};
    use crate::models::NewContact;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn login_sets_session_cookie_and_loads_contacts() {
        let ctx = testing::context();
        ctx.submit_contact(NewContact {
            ign: "Steve".into(),
            email: "steve@example.com".into(),
            phone: None,
            subject: "Hi".into(),
            message: "Hello".into(),
        })
        .await
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(ctx.clone()))
                .app_data(testing::limiter(5))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/admin/login")
            .set_json(json!({"username": "admin", "password": "admin"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie");
        assert!(cookie.max_age().is_none());
        assert!(cookie.expires().is_none());
        let id = cookie.value().parse().unwrap();
        assert!(ctx.is_authenticated(&id));
        assert_eq!(ctx.contacts().len(), 1);

        let req = test::TestRequest::get()
            .uri("/admin/session")
            .cookie(Cookie::new(SESSION_COOKIE, id.to_string()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["authenticated"], true);

        let req = test::TestRequest::post()
            .uri("/admin/logout")
            .cookie(Cookie::new(SESSION_COOKIE, id.to_string()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!ctx.is_authenticated(&id));
        assert!(ctx.contacts().is_empty());
    }

    #[actix_web::test]
    async fn wrong_credentials_are_rejected_without_cookie() {
        let ctx = testing::context();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(ctx.clone()))
                .app_data(testing::limiter(5))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/admin/login")
            .set_json(json!({"username": "admin", "password": "letmein"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.response().cookies().next().is_none());
        assert!(!ctx.sessions().any_authenticated());
    }
}
