use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use crate::scheme::{PushSubscription, StoredSubscription, VapidPublicKey};

const SERVICE_WORKER_JS: &str = include_str!("../static/service-worker.js");
const DASHBOARD_SW_JS: &str = include_str!("../static/sw.js");
const MAIN_JS: &str = include_str!("../static/js/main.js");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Subscriptions keyed by push endpoint.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn save(&self, subscription: &PushSubscription) -> anyhow::Result<SaveOutcome>;
}

pub struct MySqlStore {
    db: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = MySqlPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to the database")?;

        sqlx::query(
            "create table if not exists push_subscriptions (
                id varchar(26) primary key,
                endpoint varchar(768) not null unique,
                subscription text not null
            )",
        )
        .execute(&db)
        .await
        .context("Failed to create push_subscriptions table")?;

        Ok(Self { db })
    }
}

#[async_trait]
impl SubscriptionStore for MySqlStore {
    async fn save(&self, subscription: &PushSubscription) -> anyhow::Result<SaveOutcome> {
        let endpoint = subscription
            .endpoint()
            .context("subscription has no endpoint")?;
        let json = serde_json::to_string(subscription)?;

        let mut tx = self.db.begin().await?;

        let existing: Option<StoredSubscription> =
            sqlx::query_as("select * from push_subscriptions where endpoint = ?")
                .bind(endpoint)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some(r) if r.subscription == json => SaveOutcome::Unchanged,
            Some(r) => {
                sqlx::query("update push_subscriptions set subscription = ? where id = ?")
                    .bind(&json)
                    .bind(&r.id)
                    .execute(&mut *tx)
                    .await?;
                SaveOutcome::Updated
            }
            None => {
                sqlx::query(
                    "insert into push_subscriptions (id, endpoint, subscription) values (?, ?, ?)",
                )
                .bind(ulid::Ulid::new().to_string())
                .bind(endpoint)
                .bind(&json)
                .execute(&mut *tx)
                .await?;
                SaveOutcome::Created
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

/// In-process store, for running without a database.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn save(&self, subscription: &PushSubscription) -> anyhow::Result<SaveOutcome> {
        let endpoint = subscription
            .endpoint()
            .context("subscription has no endpoint")?;
        let json = serde_json::to_string(subscription)?;

        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| anyhow::anyhow!("subscription map poisoned"))?;
        Ok(match subscriptions.insert(endpoint.to_string(), json.clone()) {
            None => SaveOutcome::Created,
            Some(previous) if previous == json => SaveOutcome::Unchanged,
            Some(_) => SaveOutcome::Updated,
        })
    }
}

pub struct AppState {
    pub store: Arc<dyn SubscriptionStore>,
    pub vapid_public_key: Option<String>,
    pub pkg_dir: PathBuf,
}

pub async fn start_server() -> anyhow::Result<()> {
    let store: Arc<dyn SubscriptionStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => Arc::new(MySqlStore::connect(&database_url).await?),
        Err(_) => {
            log::warn!("DATABASE_URL is not set, subscriptions are kept in memory");
            Arc::new(MemoryStore::default())
        }
    };

    let vapid_public_key = std::env::var("VAPID_PUBLIC_KEY")
        .ok()
        .filter(|k| !k.is_empty());
    match &vapid_public_key {
        Some(key) => {
            if let Err(e) = crate::vapid::validate_public_key(key) {
                log::warn!("VAPID_PUBLIC_KEY is not a usable P-256 key: {:#}", e);
            }
        }
        None => log::warn!("VAPID_PUBLIC_KEY is not set, /vapid_public_key will fail"),
    }

    let state = Arc::new(AppState {
        store,
        vapid_public_key,
        pkg_dir: std::env::var("PKG_DIR")
            .unwrap_or_else(|_| "pkg".to_string())
            .into(),
    });

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .context("PORT must be a number")?;

    log::info!("listening on port {}", port);
    axum::Server::bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
        .serve(router(state).into_make_service())
        .await
        .context("server stopped")?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/vapid_public_key", get(vapid_public_key))
        .route("/api/subscribe", post(api_subscribe))
        .route("/service-worker.js", get(|| async { javascript(SERVICE_WORKER_JS) }))
        .route("/sw.js", get(|| async { javascript(DASHBOARD_SW_JS) }))
        .route("/static/js/main.js", get(|| async { javascript(MAIN_JS) }))
        .route("/pkg/:file", get(pkg_file))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn javascript(source: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "application/javascript")], source).into_response()
}

async fn vapid_public_key(State(state): State<Arc<AppState>>) -> Response {
    match &state.vapid_public_key {
        Some(key) => Json(VapidPublicKey {
            public_key: key.clone(),
        })
        .into_response(),
        None => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "VAPID public key not configured",
        ),
    }
}

async fn api_subscribe(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let subscription = match serde_json::from_slice::<PushSubscription>(&body) {
        Ok(s) if s.endpoint().is_some() => s,
        _ => return error_response(StatusCode::BAD_REQUEST, "No subscription data provided"),
    };

    match state.store.save(&subscription).await {
        Ok(outcome) => {
            log::info!(
                "subscription {:?} for {}",
                outcome,
                subscription.endpoint().unwrap_or_default()
            );
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(e) => {
            log::error!("Failed to save subscription: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn pkg_file(Path(file): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let not_found = || (StatusCode::NOT_FOUND, "Not Found").into_response();

    if file.starts_with('.') || file.contains(['/', '\\']) {
        return not_found();
    }
    let content_type = match std::path::Path::new(&file)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some("wasm") => "application/wasm",
        Some("js") => "application/javascript",
        _ => "application/octet-stream",
    };

    match tokio::fs::read(state.pkg_dir.join(&file)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => {
            log::error!("Failed to read {}: {}", file, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
