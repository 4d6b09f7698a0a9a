use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    web::{self},
    App, HttpServer,
};

use subgate::billing::provider::{BillingProvider, StripeBilling};
use subgate::billing::services::ingest::EventIngestion;
use subgate::billing::services::lifecycle::Lifecycle;
use subgate::billing::services::notify::RenewalNotice;
use subgate::billing::{mount, routes};
use subgate::common::env_config::Config;
use subgate::events::{RedisReloadPublisher, ReloadPublisher};
use subgate::identity::{GoogleVerifier, IdentityVerifier};
use subgate::mailer::{EmailTransport, HttpMailer};
use subgate::store::{self, RedisSubscriptionStore, SubscriptionStore};
use subgate::logger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init Redis
    let pool = store::connect(&config.redis_url);

    let timeout = Duration::from_secs(config.outbound_timeout_secs);

    // wire the external collaborators once; everything downstream takes
    // them by injection
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeBilling::new(&config.stripe_secret_key));
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(RedisSubscriptionStore::new(pool.clone()));
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(GoogleVerifier::new(
        config.google_userinfo_url.clone(),
        timeout,
    ));
    let reload: Arc<dyn ReloadPublisher> = Arc::new(RedisReloadPublisher::new(pool.clone()));
    let mailer: Arc<dyn EmailTransport> = Arc::new(HttpMailer::new(&config.mail, timeout));

    let lifecycle = Arc::new(Lifecycle::new(
        provider.clone(),
        subscriptions.clone(),
        reload.clone(),
        config.stripe_plan_id.clone(),
        config.support_email.clone(),
    ));
    let ingestion = Arc::new(EventIngestion::new(
        provider.clone(),
        mailer.clone(),
        RenewalNotice {
            app_name: config.app_name.clone(),
            app_url: config.app_url.clone(),
        },
        config.stripe_webhook_secret.clone(),
    ));

    let config_data = config.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(subscriptions.clone()))
            .app_data(web::Data::new(verifier.clone()))
            .app_data(web::Data::new(lifecycle.clone()))
            .app_data(web::Data::new(ingestion.clone()))
            .service(mount::mount_subscription())
            .service(mount::mount_webhook())
            .service(routes::upgrade::post_upgrade)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
