use actix_web::web::{self};

use crate::billing::routes;

pub fn mount_subscription() -> actix_web::Scope {
    web::scope("/subscription")
        .service(routes::sub::get_subscription)
        .service(routes::sub::cancel_subscription)
        .service(routes::sub::resume_subscription)
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/webhook").service(routes::webhook::post_billing)
}
