use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{require_api_key, ApiKey};
use crate::config::ServerConfig;
use crate::handlers::{
    abtests, activity, campaigns, contacts, dashboard, followups, health, metrics_handler,
    templates, webhooks, AppState,
};
use crate::openapi::ApiDoc;
use leadflow::types::now_ms;

/// Assembles the full application: public health and metrics routes, the
/// API-key protected `/1/*` surface, signature-checked webhook receivers and
/// the Swagger UI.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api_key = config.api_key.as_deref().map(ApiKey::new);
    let auth_middleware = middleware::from_fn(move |request: Request, next: Next| {
        let key = api_key.clone();
        async move { require_api_key(key, request, next).await }
    });

    let protected = Router::new()
        .route(
            "/1/contacts",
            post(contacts::create_contact).get(contacts::list_contacts),
        )
        .route(
            "/1/contacts/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route(
            "/1/campaigns",
            post(campaigns::create_campaign).get(campaigns::list_campaigns),
        )
        .route(
            "/1/campaigns/:id",
            get(campaigns::get_campaign)
                .put(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route(
            "/1/campaigns/:id/duplicate",
            post(campaigns::duplicate_campaign),
        )
        .route("/1/campaigns/:id/launch", post(campaigns::launch_campaign))
        .route("/1/campaigns/:id/pause", post(campaigns::pause_campaign))
        .route("/1/campaigns/:id/resume", post(campaigns::resume_campaign))
        .route(
            "/1/campaigns/:id/complete",
            post(campaigns::complete_campaign),
        )
        .route(
            "/1/campaigns/:id/metrics",
            post(campaigns::record_campaign_metrics),
        )
        .route(
            "/1/templates",
            post(templates::create_template).get(templates::list_templates),
        )
        .route(
            "/1/templates/:id",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route(
            "/1/templates/:id/duplicate",
            post(templates::duplicate_template),
        )
        .route("/1/templates/:id/render", post(templates::render_template))
        .route(
            "/1/abtests",
            post(abtests::create_abtest).get(abtests::list_abtests),
        )
        .route("/1/abtests/validate", post(abtests::validate_abtest))
        .route(
            "/1/abtests/:id",
            get(abtests::get_abtest).delete(abtests::delete_abtest),
        )
        .route("/1/abtests/:id/results", get(abtests::get_abtest_results))
        .route("/1/abtests/:id/pause", post(abtests::pause_abtest))
        .route("/1/abtests/:id/resume", post(abtests::resume_abtest))
        .route("/1/abtests/:id/complete", post(abtests::complete_abtest))
        .route("/1/abtests/:id/promote", post(abtests::promote_abtest))
        .route("/1/abtests/:id/duplicate", post(abtests::duplicate_abtest))
        .route(
            "/1/abtests/:id/metrics",
            post(abtests::record_abtest_metrics),
        )
        .route(
            "/1/abtests/:id/confidence",
            put(abtests::set_abtest_confidence),
        )
        .route(
            "/1/abtests/:id/assignment",
            get(abtests::get_abtest_assignment),
        )
        .route(
            "/1/followups/sequences",
            post(followups::create_sequence).get(followups::list_sequences),
        )
        .route(
            "/1/followups/sequences/:id",
            get(followups::get_sequence)
                .put(followups::update_sequence)
                .delete(followups::delete_sequence),
        )
        .route(
            "/1/followups/sequences/:id/enroll",
            post(followups::enroll_contact),
        )
        .route(
            "/1/followups/executions",
            get(followups::list_executions),
        )
        .route(
            "/1/followups/executions/:id",
            get(followups::get_execution),
        )
        .route(
            "/1/followups/executions/:id/advance",
            post(followups::advance_execution),
        )
        .route(
            "/1/followups/executions/:id/cancel",
            post(followups::cancel_execution),
        )
        .route("/1/followups/run", post(followups::run_due))
        .route("/1/dashboard/overview", get(dashboard::overview))
        .route("/1/dashboard/channels", get(dashboard::channels))
        .route("/1/activity", get(activity::recent_activity))
        .route_layer(auth_middleware)
        .with_state(state.clone());

    // Webhook senders cannot hold the API key; they authenticate by signature.
    let webhook_routes = Router::new()
        .route("/1/webhooks/campaigns", post(webhooks::campaign_webhook))
        .route("/1/webhooks/interest", post(webhooks::interest_webhook))
        .with_state(state.clone());

    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let swagger = SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new()
        .merge(public)
        .merge(swagger)
        .merge(webhook_routes)
        .merge(protected)
        .layer(DefaultBodyLimit::max(config.max_body_bytes()))
        .layer(CorsLayer::very_permissive().max_age(Duration::from_secs(86400)))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let startup_start = Instant::now();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let state = Arc::new(AppState::open(
        &config.data_dir,
        config.activity_capacity,
        config.webhook_secret.clone(),
    )?);
    tracing::info!(
        data_dir = %config.data_dir.display(),
        contacts = state.contacts.len(),
        campaigns = state.campaigns.len(),
        templates = state.templates.len(),
        abtests = state.abtests.len(),
        sequences = state.followups.sequence_count(),
        "Stores loaded"
    );

    if config.followup_tick_secs > 0 {
        let scheduler_state = Arc::clone(&state);
        let interval_secs = config.followup_tick_secs;
        tokio::spawn(async move {
            followup_scheduler(scheduler_state, interval_secs).await;
        });
        tracing::info!("Follow-up scheduler running every {}s", interval_secs);
    }

    let app = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    print_startup_banner(local_addr, &config, startup_start.elapsed().as_millis());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn followup_scheduler(state: Arc<AppState>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await;
    loop {
        interval.tick().await;
        let state = state.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || followups::run_followups(&state, now_ms())).await
        {
            tracing::warn!("Follow-up run aborted: {}", e);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn print_startup_banner(addr: SocketAddr, config: &ServerConfig, startup_ms: u128) {
    use colored::Colorize;

    let url = format!("http://{}", addr);
    let version = format!("v{}", env!("CARGO_PKG_VERSION"));
    let timing = format!("ready in {}ms", startup_ms);

    println!();
    println!(
        "  {} {}  {}",
        "Leadflow".bold().bright_green(),
        version.as_str().dimmed(),
        timing.as_str().dimmed(),
    );
    println!();
    println!("  {}  Local:      {}", "➜".green(), url.as_str().cyan());
    let docs = format!("{}/swagger-ui", url);
    println!("  {}  API Docs:   {}", "➜".green(), docs.as_str().cyan());
    let metrics = format!("{}/metrics", url);
    println!("  {}  Metrics:    {}", "➜".green(), metrics.as_str().cyan());
    println!(
        "  {}  Data:       {}",
        "➜".green(),
        config.data_dir.display().to_string().as_str().dimmed()
    );
    println!();

    match config.api_key {
        Some(_) => println!(
            "  {}  API key:    {} (send {})",
            "🔒".bold().green(),
            "Enabled".green().bold(),
            crate::auth::API_KEY_HEADER.cyan()
        ),
        None => println!(
            "  {}  API key:    {} (set {} to protect /1/*)",
            "⚠️".bold(),
            "Disabled".yellow().bold(),
            "LEADFLOW_API_KEY".cyan()
        ),
    }
    match config.webhook_secret {
        Some(_) => println!(
            "  {}  Webhooks:   {} (send {})",
            "🔒".bold().green(),
            "Signed".green().bold(),
            leadflow::webhooks::SIGNATURE_HEADER.cyan()
        ),
        None => println!(
            "  {}  Webhooks:   {} (set {} to require signatures)",
            "⚠️".bold(),
            "Unsigned".yellow().bold(),
            "LEADFLOW_WEBHOOK_SECRET".cyan()
        ),
    }
    if config.followup_tick_secs > 0 {
        println!(
            "  {}  Follow-ups: every {}s",
            "⏱".bold(),
            config.followup_tick_secs
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::API_KEY_HEADER;
    use axum::body::Body;
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(tmp: &TempDir, api_key: Option<&str>) -> Router {
        let config = ServerConfig {
            data_dir: tmp.path().to_path_buf(),
            api_key: api_key.map(str::to_string),
            ..Default::default()
        };
        let state = Arc::new(AppState::open(tmp.path(), 100, None).unwrap());
        build_router(state, &config)
    }

    fn get_request(uri: &str, key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(k) = key {
            builder = builder.header(API_KEY_HEADER, k);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn api_routes_require_key_when_configured() {
        let tmp = TempDir::new().unwrap();
        let app = app(&tmp, Some("secret-key"));

        let resp = app
            .clone()
            .oneshot(get_request("/1/contacts", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .clone()
            .oneshot(get_request("/1/contacts", Some("secret-key")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhooks_bypass_api_key() {
        let tmp = TempDir::new().unwrap();
        let body = json!({"channel": "whatsapp", "interestLevel": "warm", "phone": "+15550100"});
        let resp = app(&tmp, Some("secret-key"))
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/1/webhooks/interest")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let tmp = TempDir::new().unwrap();
        let resp = app(&tmp, None)
            .oneshot(get_request("/api-docs/openapi.json", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let resp = app(&tmp, Some("secret-key"))
            .oneshot(get_request("/1/nothing-here", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
