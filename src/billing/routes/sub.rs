use std::sync::Arc;

use actix_web::{get, post, web, HttpRequest, Responder};
use log::info;

use crate::billing::dtos::sub::{MessageResponse, SubscriptionResponse};
use crate::billing::guards;
use crate::billing::services::lifecycle::Lifecycle;
use crate::common::error::Res;
use crate::common::http::Success;
use crate::identity::IdentityVerifier;
use crate::store::SubscriptionStore;

/// Returns the stored subscription snapshot for a user. Installs the lookup
/// guard only.
#[get("/{user_id}")]
pub async fn get_subscription(
    path: web::Path<String>,
    store: web::Data<Arc<dyn SubscriptionStore>>,
) -> Res<impl Responder> {
    let user_id = path.into_inner();
    let ctx = guards::authorize_read(store.get_ref().as_ref(), &user_id).await?;

    Success::ok(SubscriptionResponse {
        subscription: ctx.subscription,
    })
}

/// Schedules cancellation at period end. Requires the lookup and identity
/// guards; the verified identity must own the path user id.
#[post("/{user_id}/cancel")]
pub async fn cancel_subscription(
    req: HttpRequest,
    path: web::Path<String>,
    store: web::Data<Arc<dyn SubscriptionStore>>,
    verifier: web::Data<Arc<dyn IdentityVerifier>>,
    lifecycle: web::Data<Arc<Lifecycle>>,
) -> Res<impl Responder> {
    let user_id = path.into_inner();
    let credential = guards::bearer_credential(&req);
    let ctx = guards::authorize_mutation(
        store.get_ref().as_ref(),
        verifier.get_ref().as_ref(),
        &user_id,
        credential.as_deref(),
    )
    .await?;

    let updated = lifecycle.cancel(&ctx.subscription).await?;
    info!("Subscription cancellation scheduled for {}", user_id);

    Success::ok(MessageResponse {
        message: format!(
            "Subscription canceled for this user. Will stay valid until {}.",
            updated.period_end_rfc3339()
        ),
    })
}

/// Clears a scheduled cancellation. Same guard chain as cancel.
#[post("/{user_id}/resume")]
pub async fn resume_subscription(
    req: HttpRequest,
    path: web::Path<String>,
    store: web::Data<Arc<dyn SubscriptionStore>>,
    verifier: web::Data<Arc<dyn IdentityVerifier>>,
    lifecycle: web::Data<Arc<Lifecycle>>,
) -> Res<impl Responder> {
    let user_id = path.into_inner();
    let credential = guards::bearer_credential(&req);
    let ctx = guards::authorize_mutation(
        store.get_ref().as_ref(),
        verifier.get_ref().as_ref(),
        &user_id,
        credential.as_deref(),
    )
    .await?;

    lifecycle.resume(&ctx.subscription).await?;
    info!("Subscription resumed for {}", user_id);

    Success::ok(MessageResponse {
        message: "Subscription resumed for this user.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    use crate::billing::mount;
    use crate::billing::provider::BillingProvider;
    use crate::billing::support::{record, CountingReload, MemoryStore, MockBilling, MockVerifier};

    fn service_data(
        store: MemoryStore,
        verifier: MockVerifier,
    ) -> (
        web::Data<Arc<dyn SubscriptionStore>>,
        web::Data<Arc<dyn IdentityVerifier>>,
        web::Data<Arc<Lifecycle>>,
    ) {
        let store: Arc<dyn SubscriptionStore> = Arc::new(store);
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(verifier);
        let provider: Arc<dyn BillingProvider> = Arc::new(MockBilling::new());
        let lifecycle = Arc::new(Lifecycle::new(
            provider,
            store.clone(),
            Arc::new(CountingReload::new()),
            "price_paid_plan".to_string(),
            "support@app.example".to_string(),
        ));
        (
            web::Data::new(store),
            web::Data::new(verifier),
            web::Data::new(lifecycle),
        )
    }

    #[actix_web::test]
    async fn cancel_response_names_the_period_end_instant() {
        let (store, verifier, lifecycle) = service_data(
            MemoryStore::with(record("user-1", 1704067200, false)),
            MockVerifier::accepting("user-1"),
        );
        let app = test::init_service(
            App::new()
                .app_data(store)
                .app_data(verifier)
                .app_data(lifecycle)
                .service(mount::mount_subscription()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/subscription/user-1/cancel")
            .insert_header(("Authorization", "Bearer token"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let message = body["message"].as_str().unwrap();
        assert!(message.contains("2024-01-01T00:00:00Z"), "{}", message);
    }

    #[actix_web::test]
    async fn unknown_user_gets_404_before_identity_check() {
        let mock_verifier = Arc::new(MockVerifier::accepting("user-1"));

        let store: Arc<dyn SubscriptionStore> = Arc::new(MemoryStore::new());
        let verifier: Arc<dyn IdentityVerifier> = mock_verifier.clone();
        let provider: Arc<dyn BillingProvider> = Arc::new(MockBilling::new());
        let lifecycle = Arc::new(Lifecycle::new(
            provider,
            store.clone(),
            Arc::new(CountingReload::new()),
            "price_paid_plan".to_string(),
            "support@app.example".to_string(),
        ));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .app_data(web::Data::new(verifier))
                .app_data(web::Data::new(lifecycle))
                .service(mount::mount_subscription()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/subscription/user-1/cancel")
            .insert_header(("Authorization", "Bearer token"))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), actix_web::http::StatusCode::NOT_FOUND);
        assert_eq!(mock_verifier.calls(), 0);
    }
}
