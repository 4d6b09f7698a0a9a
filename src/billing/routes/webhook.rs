use std::sync::Arc;

use actix_web::{post, web, HttpRequest, Responder};

use crate::billing::services::ingest::EventIngestion;
use crate::common::error::Res;
use crate::common::http::Success;

/// Billing provider push endpoint. Signature-authenticated; everything else
/// happens in [`EventIngestion`].
#[post("/billing")]
pub async fn post_billing(
    payload: String,
    req: HttpRequest,
    ingestion: web::Data<Arc<EventIngestion>>,
) -> Res<impl Responder> {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    ingestion.handle(&payload, signature).await?;

    Success::ok(serde_json::json!({}))
}
