use actix_web::web;
use crate::handlers;

/// Configures API routes that require a bearer token.
/// Mounted under the "/api" scope in main.rs; handlers authenticate through
/// the `AuthenticatedUser` extractor.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Payment routes (/api/payment/*)
    cfg.service(
        web::scope("/payment")
            .service(handlers::payment_handlers::verify_success)
    );
}

/// Configures webhook routes that DO NOT require JWT authentication.
/// Mounted under the "/webhooks" scope in main.rs.
pub fn configure_webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::webhook_handlers::stripe_webhook);
    cfg.service(handlers::webhook_handlers::creem_webhook);
}

/// Mounts every route of the server.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::health_check))
        .service(web::scope("/api").configure(configure_routes))
        .service(web::scope("/webhooks").configure(configure_webhook_routes));
}
