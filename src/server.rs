//! HTTP surface: webhook intake, its health check, and the stats endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{Config, TransportMode};
use crate::dispatcher::{Ack, CommandDispatcher};
use crate::events::InboundEvent;
use crate::registry::{DailyStats, Registry, RegistryError, TotalStats, UserProfile};

const DEFAULT_STATS_DAYS: u32 = 7;
const MAX_STATS_DAYS: u32 = 365;

/// Header Telegram sets to the `secret_token` registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Which routes are mounted and how webhook calls are authenticated.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Mount `POST /webhook`. Off in polling mode, where Telegram never calls it.
    pub accept_webhook: bool,
    pub webhook_secret: Option<String>,
}

impl ServerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            accept_webhook: config.server.mode == TransportMode::Webhook,
            webhook_secret: config.telegram.webhook_secret.clone(),
        }
    }
}

struct AppState {
    dispatcher: Arc<CommandDispatcher>,
    webhook_secret: Option<String>,
}

pub fn router(dispatcher: Arc<CommandDispatcher>, options: ServerOptions) -> Router {
    let state = Arc::new(AppState {
        dispatcher,
        webhook_secret: options.webhook_secret,
    });

    let webhook_routes = if options.accept_webhook {
        get(webhook_health).post(webhook)
    } else {
        get(webhook_health)
    };

    Router::new()
        .route("/webhook", webhook_routes)
        .route("/api/stats", get(stats))
        .with_state(state)
}

pub async fn serve(
    addr: std::net::SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
    options: ServerOptions,
) -> anyhow::Result<()> {
    if options.accept_webhook && options.webhook_secret.is_none() {
        warn!("Webhook enabled without telegram.webhook_secret: updates are not authenticated");
    }
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(dispatcher, options))
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}

/// Whether the request carries the configured secret. No secret configured accepts all.
fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    match expected {
        None => true,
        Some(expected) => headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == expected),
    }
}

async fn webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !is_authorized(state.webhook_secret.as_deref(), &headers) {
        warn!("Rejecting webhook call with missing or wrong secret token");
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response();
    }

    let ack = match InboundEvent::from_json(&body) {
        Ok(event) => state.dispatcher.handle(event).await,
        Err(e) => {
            warn!("Rejecting webhook update: {}", e);
            Ack::Malformed
        }
    };

    match ack {
        Ack::Ok => Json(json!({ "ok": true })).into_response(),
        Ack::Malformed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error" })),
        )
            .into_response(),
    }
}

async fn webhook_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = if state.dispatcher.registry().is_configured() {
        "connected"
    } else {
        "not configured"
    };
    Json(json!({
        "status": "Bot webhook is active",
        "database": database,
    }))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    days: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PeriodChanges {
    new_users: i64,
    interactions: i64,
    stars_earned: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodSummary {
    days: u32,
    new_users: i64,
    interactions: i64,
    stars_earned: i64,
    changes: PeriodChanges,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    configured: bool,
    total: TotalStats,
    period: PeriodSummary,
    daily_stats: Vec<DailyStats>,
    users: Vec<UserProfile>,
}

/// Percentage change, rounded. A zero baseline counts as +100% when anything happened.
fn percent_change(current: i64, previous: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    (((current - previous) as f64 / previous as f64) * 100.0).round() as i64
}

#[derive(Default)]
struct Sums {
    new_users: i64,
    interactions: i64,
    stars_earned: i64,
}

fn sum(days: &[DailyStats]) -> Sums {
    days.iter().fold(Sums::default(), |acc, d| Sums {
        new_users: acc.new_users + d.new_users,
        interactions: acc.interactions + d.interactions,
        stars_earned: acc.stars_earned + d.stars_earned,
    })
}

async fn build_stats(registry: &Registry, days: u32) -> Result<StatsResponse, RegistryError> {
    let total = registry.totals().await?;
    // Oldest first: the first `days` entries are the preceding window.
    let mut window = registry.stats_for_period(days * 2).await?;
    let current = window.split_off(days as usize);
    let previous = window;
    let users = registry.list_users().await?;

    let cur = sum(&current);
    let prev = sum(&previous);
    Ok(StatsResponse {
        configured: true,
        total,
        period: PeriodSummary {
            days,
            new_users: cur.new_users,
            interactions: cur.interactions,
            stars_earned: cur.stars_earned,
            changes: PeriodChanges {
                new_users: percent_change(cur.new_users, prev.new_users),
                interactions: percent_change(cur.interactions, prev.interactions),
                stars_earned: percent_change(cur.stars_earned, prev.stars_earned),
            },
        },
        daily_stats: current,
        users,
    })
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    let days = query
        .days
        .unwrap_or(DEFAULT_STATS_DAYS)
        .clamp(1, MAX_STATS_DAYS);

    match build_stats(state.dispatcher.registry(), days).await {
        Ok(body) => Json(body).into_response(),
        Err(RegistryError::NotConfigured) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "Database not configured",
                "message": "Please configure [registry] database_path in the bot configuration.",
                "configured": false,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Stats API error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch stats",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::PricesConfig;
    use crate::dispatcher::DispatcherSettings;
    use crate::platform::fake::{Call, FakeChatApi};
    use crate::registry::{RegistryStore, StatField};
    use crate::scheduler::RetractionScheduler;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(registry: Registry) -> (Router, Arc<FakeChatApi>) {
        app_with(
            registry,
            ServerOptions {
                accept_webhook: true,
                webhook_secret: None,
            },
        )
    }

    fn app_with(registry: Registry, options: ServerOptions) -> (Router, Arc<FakeChatApi>) {
        let api = Arc::new(FakeChatApi::new());
        let catalog: Catalog = serde_json::from_value(json!({
            "photos": ["p1"],
            "start": { "en": "Welcome" }
        }))
        .unwrap();
        let dispatcher = CommandDispatcher::new(
            DispatcherSettings {
                admin_id: 1,
                channel_id: -100,
                channel_link: "https://t.me/+chan".to_string(),
                contact_links: Vec::new(),
                prices: PricesConfig::default(),
                retraction_delay: Duration::from_secs(3600),
            },
            api.clone(),
            registry,
            Arc::new(catalog),
            RetractionScheduler::start(api.clone()),
        );
        (router(Arc::new(dispatcher), options), api)
    }

    fn configured() -> Registry {
        Registry::new(
            Some(RegistryStore::open_in_memory().unwrap()),
            chrono_tz::Europe::Madrid,
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn registry_with_users(ids: &[i64]) -> Registry {
        let registry = configured();
        for id in ids {
            registry
                .add_to_set(crate::registry::ALL_USERS_SET, *id)
                .await
                .unwrap();
        }
        registry
    }

    fn admin_broadcast(secret: Option<&str>) -> Request<Body> {
        let update = json!({
            "update_id": 9,
            "message": {
                "message_id": 3,
                "from": { "id": 1, "first_name": "Admin" },
                "chat": { "id": 1 },
                "text": "!toEveryone! SPAM"
            }
        });
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_TOKEN_HEADER, secret);
        }
        builder.body(Body::from(update.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_secret_gates_dispatch() {
        let options = ServerOptions {
            accept_webhook: true,
            webhook_secret: Some("s3cret".to_string()),
        };
        let (app, api) = app_with(registry_with_users(&[1, 2, 3]).await, options);

        for secret in [None, Some("wrong")] {
            let response = app.clone().oneshot(admin_broadcast(secret)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        assert!(api.calls().is_empty());

        let response = app.oneshot(admin_broadcast(Some("s3cret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(api.texts_to(2), vec!["SPAM".to_string()]);
        assert_eq!(api.texts_to(3), vec!["SPAM".to_string()]);
    }

    #[tokio::test]
    async fn test_polling_mode_does_not_accept_updates() {
        let (app, api) = app_with(registry_with_users(&[1, 2]).await, ServerOptions::default());

        let response = app.clone().oneshot(admin_broadcast(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(api.calls().is_empty());

        let health = app
            .oneshot(Request::get("/webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[test]
    fn test_is_authorized() {
        let mut headers = HeaderMap::new();
        assert!(is_authorized(None, &headers));
        assert!(!is_authorized(Some("a"), &headers));
        headers.insert(SECRET_TOKEN_HEADER, "b".parse().unwrap());
        assert!(!is_authorized(Some("a"), &headers));
        assert!(is_authorized(Some("b"), &headers));
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(0, 0), 0);
        assert_eq!(percent_change(5, 0), 100);
        assert_eq!(percent_change(15, 10), 50);
        assert_eq!(percent_change(5, 10), -50);
        assert_eq!(percent_change(1, 3), -67);
    }

    #[tokio::test]
    async fn test_webhook_dispatches_and_acks() {
        let (app, api) = app(Registry::unconfigured());
        let update = json!({
            "update_id": 1,
            "pre_checkout_query": {
                "id": "q1",
                "from": { "id": 7, "first_name": "Ada" },
                "currency": "XTR",
                "total_amount": 50,
                "invoice_payload": "photo_7_1"
            }
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(update.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
        assert_eq!(
            api.calls(),
            vec![Call::PreCheckout {
                query_id: "q1".to_string(),
                ok: true
            }]
        );
    }

    #[tokio::test]
    async fn test_webhook_rejects_malformed_body() {
        let (app, api) = app(Registry::unconfigured());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal server error" })
        );
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_health_reports_database() {
        let (app, _) = app(configured());
        let response = app
            .oneshot(Request::get("/webhook").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            body_json(response).await,
            json!({ "status": "Bot webhook is active", "database": "connected" })
        );
    }

    #[tokio::test]
    async fn test_stats_unconfigured_is_503() {
        let (app, _) = app(Registry::unconfigured());
        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["configured"], false);
        assert_eq!(body["error"], "Database not configured");
    }

    #[tokio::test]
    async fn test_stats_reports_period_and_totals() {
        let registry = configured();
        registry.increment(StatField::StarsEarned, 150).await.unwrap();
        registry.increment(StatField::Interactions, 4).await.unwrap();
        let (app, _) = app(registry);

        let response = app
            .oneshot(
                Request::get("/api/stats?days=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["configured"], true);
        assert_eq!(body["period"]["days"], 3);
        assert_eq!(body["period"]["starsEarned"], 150);
        assert_eq!(body["period"]["changes"]["starsEarned"], 100);
        assert_eq!(body["dailyStats"].as_array().unwrap().len(), 3);
        assert_eq!(body["total"]["totalStars"], 150);
        assert!(body["users"].as_array().unwrap().is_empty());
    }
}
