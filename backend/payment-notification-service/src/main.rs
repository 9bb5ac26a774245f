use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use payment_notification_service::{
    db,
    gateway::{PaymentGateway, VnpayGateway},
    handlers, logging, metrics,
    middleware::JwtAuth,
    services::{
        AudienceResolver, NotificationStore, PaymentRepository, PgAudienceResolver,
        PgNotificationStore, PgPaymentRepository,
    },
    Config, ConnectionManager, NotificationDispatcher, PaymentConfirmationHandler,
    RealtimeHandle,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    tracing::info!("Starting payment notification service");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let db_pool = db::create_pool(&config.database)
        .await
        .context("failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    let store: Arc<dyn NotificationStore> = Arc::new(PgNotificationStore::new(db_pool.clone()));
    let audience: Arc<dyn AudienceResolver> = Arc::new(PgAudienceResolver::new(db_pool.clone()));
    let payments: Arc<dyn PaymentRepository> = Arc::new(PgPaymentRepository::new(db_pool));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(VnpayGateway::new(&config.gateway));

    // Producers get the handle now; the gateway is installed once the server binds.
    let realtime = RealtimeHandle::new();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        audience,
        realtime.clone(),
    ));
    let confirmation = Arc::new(PaymentConfirmationHandler::new(
        payments, dispatcher, gateway,
    ));

    let connection_manager = ConnectionManager::new();
    let auth = JwtAuth::new(&config.jwt.secret);
    let app_config = config.app.clone();
    let addr = format!("{}:{}", config.app.host, config.app.port);

    let server_manager = connection_manager.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&app_config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        let auth = auth.clone();
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(confirmation.clone()))
            .app_data(web::Data::new(server_manager.clone()))
            .app_data(web::Data::new(app_config.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .configure(move |cfg| handlers::configure_routes(cfg, auth))
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?;

    realtime.install(connection_manager);
    tracing::info!("Realtime gateway installed, HTTP server listening on {}", addr);

    server.run().await.context("HTTP server error")?;
    Ok(())
}
