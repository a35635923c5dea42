// src/handlers/hooks.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, warn};
use serde::Deserialize;

use super::SiteContext;
use crate::storage::{ChangeEvent, ChangeKind, Table};
use crate::utils::{constant_time_eq, ApiError};

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Secret the database webhook must present. `None` refuses every delivery.
pub struct WebhookSecret(pub Option<String>);

/// Body of a database webhook delivery. Only the table and the kind of change
/// matter; the row itself is re-read by the reload.
#[derive(Debug, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
}

pub async fn handle_change(
    req: HttpRequest,
    context: web::Data<SiteContext>,
    secret: web::Data<WebhookSecret>,
    payload: web::Json<ChangePayload>,
) -> Result<HttpResponse, ApiError> {
    let Some(expected) = secret.0.as_deref() else {
        warn!("Change notification received but WEBHOOK_SECRET is not set");
        return Err(ApiError::InvalidWebhookSecret);
    };
    let presented = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    let matches =
        presented.map_or(false, |p| constant_time_eq(p.as_bytes(), expected.as_bytes()));
    if !matches {
        error!("Change notification with a bad secret");
        return Err(ApiError::InvalidWebhookSecret);
    }

    if let Some(schema) = payload.schema.as_deref() {
        if schema != "public" {
            debug!("Ignoring change in schema {}", schema);
            return Ok(HttpResponse::Accepted().finish());
        }
    }

    let table = match payload.table.parse::<Table>() {
        Ok(table) => table,
        Err(e) => {
            error!("Change notification for {}", e);
            return Ok(HttpResponse::BadRequest().body(e));
        }
    };

    debug!("{:?} notification for {}", payload.kind, table);
    context.store().changes().publish(ChangeEvent {
        table,
        kind: payload.kind,
    });
    Ok(HttpResponse::Accepted().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{configure, testing};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    #[actix_web::test]
    async fn valid_notification_is_published() {
        let ctx = testing::context();
        let mut changes = ctx.store().changes().subscribe();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(ctx.clone()))
                .app_data(testing::limiter(5))
                .app_data(web::Data::new(WebhookSecret(Some(testing::TEST_SECRET.into()))))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/hooks/changes")
            .insert_header((SECRET_HEADER, testing::TEST_SECRET))
            .set_json(json!({
                "type": "UPDATE",
                "table": "server_status",
                "schema": "public",
                "record": {"id": 1, "players": "4"},
                "old_record": {"id": 1, "players": "3"}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let event = changes.try_recv().unwrap();
        assert_eq!(event.table, Table::ServerStatus);
        assert_eq!(event.kind, ChangeKind::Update);
    }

    #[actix_web::test]
    async fn bad_secret_and_unknown_table_are_rejected() {
        let ctx = testing::context();
        let mut changes = ctx.store().changes().subscribe();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(ctx.clone()))
                .app_data(testing::limiter(5))
                .app_data(web::Data::new(WebhookSecret(Some(testing::TEST_SECRET.into()))))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/hooks/changes")
            .insert_header((SECRET_HEADER, "guess"))
            .set_json(json!({"type": "INSERT", "table": "news"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/hooks/changes")
            .insert_header((SECRET_HEADER, "hook-secreT"))
            .set_json(json!({"type": "INSERT", "table": "news"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/hooks/changes")
            .set_json(json!({"type": "INSERT", "table": "news"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/hooks/changes")
            .insert_header((SECRET_HEADER, testing::TEST_SECRET))
            .set_json(json!({"type": "INSERT", "table": "users"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(changes.try_recv().is_err());
    }
}
