//! Request guard stages.
//!
//! Each stage either resolves data for the handler or rejects the request
//! with a final error response; once a stage rejects, nothing after it runs.
//! Routes compose the stages they need: read-only routes install the
//! subscription lookup alone, mutating routes install lookup then identity
//! match. Handlers receive a context struct carrying exactly the fields
//! their composition guarantees.

use actix_web::HttpRequest;
use log::{error, info, warn};

use crate::billing::models::sub::SubscriptionRecord;
use crate::common::error::{AppError, Res};
use crate::identity::{GoogleIdentity, IdentityVerifier};
use crate::store::SubscriptionStore;

/// Context for routes that only installed the subscription lookup.
pub struct SubscriptionContext {
    pub subscription: SubscriptionRecord,
}

/// Context for mutating routes: lookup plus verified identity.
pub struct MutationContext {
    pub subscription: SubscriptionRecord,
    pub identity: GoogleIdentity,
}

/// Stage 1: resolve the user's subscription or reject with 404.
pub async fn load_subscription(
    store: &dyn SubscriptionStore,
    user_id: &str,
) -> Res<SubscriptionRecord> {
    match store.get(user_id).await? {
        Some(subscription) => Ok(subscription),
        None => {
            info!("No subscription on record for {}", user_id);
            Err(AppError::NotFound(
                "Cannot find subscription for this user.".to_string(),
            ))
        }
    }
}

/// Stage 2: verify the credential and require it to belong to `user_id`.
///
/// A missing credential is rejected outright; this stage is only installed
/// on routes that must not be reachable anonymously.
pub async fn match_identity(
    verifier: &dyn IdentityVerifier,
    user_id: &str,
    credential: Option<&str>,
) -> Res<GoogleIdentity> {
    let token = credential.ok_or_else(|| {
        warn!("Mutation attempted for {} without a credential", user_id);
        AppError::Unauthorized(
            "An authentication token is required to modify this subscription.".to_string(),
        )
    })?;

    let identity = match verifier.verify(token).await {
        Ok(identity) => identity,
        Err(err) => {
            error!("Identity verification failed for {}: {}", user_id, err);
            return Err(AppError::Unauthorized(
                "Unable to find a Google user account with the provided authentication token."
                    .to_string(),
            ));
        }
    };

    if identity.id != user_id {
        warn!(
            "Identity {} does not match path user {}",
            identity.id, user_id
        );
        return Err(AppError::Unauthorized(
            "The subscription you are trying to modify isn't attached to the user you are \
             currently logged in with."
                .to_string(),
        ));
    }

    Ok(identity)
}

/// Composition for read-only routes: Stage 1 only.
pub async fn authorize_read(
    store: &dyn SubscriptionStore,
    user_id: &str,
) -> Res<SubscriptionContext> {
    let subscription = load_subscription(store, user_id).await?;
    Ok(SubscriptionContext { subscription })
}

/// Composition for mutating routes: Stage 1, then Stage 2.
pub async fn authorize_mutation(
    store: &dyn SubscriptionStore,
    verifier: &dyn IdentityVerifier,
    user_id: &str,
    credential: Option<&str>,
) -> Res<MutationContext> {
    let subscription = load_subscription(store, user_id).await?;
    let identity = match_identity(verifier, user_id, credential).await?;
    Ok(MutationContext {
        subscription,
        identity,
    })
}

/// Extracts the bearer credential from the `Authorization` header, falling
/// back to the `access_token` cookie.
pub fn bearer_credential(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").map(str::to_owned))
        .or_else(|| req.cookie("access_token").map(|c| c.value().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::support::{record, MemoryStore, MockVerifier};

    #[tokio::test]
    async fn missing_subscription_rejects_before_identity_stage() {
        let store = MemoryStore::new();
        let verifier = MockVerifier::accepting("user-1");

        let result = authorize_mutation(&store, &verifier, "user-1", Some("token")).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn mismatched_identity_is_unauthorized() {
        let store = MemoryStore::with(record("user-1", 1704067200, false));
        let verifier = MockVerifier::accepting("someone-else");

        let result = authorize_mutation(&store, &verifier, "user-1", Some("token")).await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized_without_verifier_call() {
        let store = MemoryStore::with(record("user-1", 1704067200, false));
        let verifier = MockVerifier::accepting("user-1");

        let result = authorize_mutation(&store, &verifier, "user-1", None).await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn verifier_failure_maps_to_unauthorized() {
        let store = MemoryStore::with(record("user-1", 1704067200, false));
        let verifier = MockVerifier::failing();

        let result = authorize_mutation(&store, &verifier, "user-1", Some("token")).await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn matching_identity_yields_full_context() {
        let store = MemoryStore::with(record("user-1", 1704067200, false));
        let verifier = MockVerifier::accepting("user-1");

        let ctx = authorize_mutation(&store, &verifier, "user-1", Some("token"))
            .await
            .unwrap();

        assert_eq!(ctx.subscription.user_id, "user-1");
        assert_eq!(ctx.identity.id, "user-1");
    }

    #[tokio::test]
    async fn read_route_installs_lookup_only() {
        let store = MemoryStore::with(record("user-2", 1704067200, true));

        let ctx = authorize_read(&store, "user-2").await.unwrap();

        assert!(ctx.subscription.cancel_at_period_end);
    }

    #[test]
    fn credential_prefers_bearer_header() {
        let req = actix_web::test::TestRequest::default()
            .insert_header(("Authorization", "Bearer header-token"))
            .cookie(actix_web::cookie::Cookie::new("access_token", "cookie-token"))
            .to_http_request();

        assert_eq!(bearer_credential(&req).as_deref(), Some("header-token"));
    }

    #[test]
    fn credential_falls_back_to_cookie() {
        let req = actix_web::test::TestRequest::default()
            .cookie(actix_web::cookie::Cookie::new("access_token", "cookie-token"))
            .to_http_request();

        assert_eq!(bearer_credential(&req).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn absent_credential_is_none() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        assert_eq!(bearer_credential(&req), None);
    }
}
