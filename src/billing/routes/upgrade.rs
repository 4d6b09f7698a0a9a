use std::sync::Arc;

use actix_web::{post, web, HttpResponse, Responder};
use log::{error, info};

use crate::billing::dtos::sub::UpgradeForm;
use crate::billing::services::lifecycle::Lifecycle;

/// First-payment checkout submission. No guard stages run here; the
/// payment-method token is the proof of intent. Responds with a redirect
/// either way so the checkout page can hand the browser back to the app.
#[post("/upgrade")]
pub async fn post_upgrade(
    form: web::Form<UpgradeForm>,
    lifecycle: web::Data<Arc<Lifecycle>>,
) -> impl Responder {
    let form = form.into_inner();
    info!("Received upgrade request for {}", form.user_id);

    match lifecycle.upgrade(&form).await {
        Ok(_) => HttpResponse::Found()
            .append_header(("Location", form.success_url))
            .finish(),
        Err(err) => {
            error!("Failed to process upgrade for {}: {}", form.user_id, err);
            HttpResponse::Found()
                .append_header(("Location", form.failure_url))
                .finish()
        }
    }
}
