//! Page-side activation flow.
//!
//! Permission, worker registration, key fetch, subscription and server
//! persistence run strictly in that order; each step only starts once the
//! previous one succeeded. Browser access goes through [`Platform`] so the
//! flow can be driven by a mock in tests.

use async_trait::async_trait;

use crate::key::{self, KeyError};
use crate::scheme::{PushSubscription, VapidPublicKey};

pub const SERVICE_WORKER_PATH: &str = "/service-worker.js";
pub const VAPID_KEY_PATH: &str = "/vapid_public_key";
pub const SUBSCRIBE_PATH: &str = "/api/subscribe";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("ServiceWorker or PushManager is not supported in this browser")]
    Unsupported,
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("{context} (status {status})")]
    Http { context: &'static str, status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Platform(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

/// The browser APIs the activation flow needs.
#[async_trait(?Send)]
pub trait Platform {
    /// Whether a service worker container and `PushManager` exist.
    fn supports_push(&self) -> bool;

    async fn request_permission(&self) -> Result<Permission, PushError>;

    async fn register_worker(&self, script_url: &str) -> Result<(), PushError>;

    /// Resolves once a registration is active.
    async fn worker_ready(&self) -> Result<(), PushError>;

    async fn subscribe(&self, options: SubscribeOptions) -> Result<PushSubscription, PushError>;

    async fn current_subscription(&self) -> Result<Option<PushSubscription>, PushError>;

    async fn get(&self, path: &str) -> Result<HttpResponse, PushError>;

    async fn post_json(&self, path: &str, body: String) -> Result<HttpResponse, PushError>;

    fn alert(&self, message: &str);
}

pub async fn ask_permission<P: Platform + ?Sized>(platform: &P) -> Result<bool, PushError> {
    Ok(platform.request_permission().await? == Permission::Granted)
}

pub async fn register_worker<P: Platform + ?Sized>(platform: &P) -> Result<(), PushError> {
    if !platform.supports_push() {
        return Err(PushError::Unsupported);
    }
    platform.register_worker(SERVICE_WORKER_PATH).await?;
    log::info!("service worker registered at {}", SERVICE_WORKER_PATH);
    Ok(())
}

pub async fn fetch_server_key<P: Platform + ?Sized>(platform: &P) -> Result<Vec<u8>, PushError> {
    let res = platform.get(VAPID_KEY_PATH).await?;
    if !res.is_success() {
        return Err(PushError::Http {
            context: "failed to fetch VAPID key from server",
            status: res.status,
        });
    }
    let VapidPublicKey { public_key } = serde_json::from_str(&res.body)?;
    Ok(key::url_base64_to_bytes(&public_key)?)
}

/// Subscribes through the ready registration and stores the result on the
/// server.
pub async fn subscribe_user<P: Platform + ?Sized>(
    platform: &P,
) -> Result<PushSubscription, PushError> {
    platform.worker_ready().await?;

    let application_server_key = fetch_server_key(platform).await?;
    let subscription = platform
        .subscribe(SubscribeOptions {
            user_visible_only: true,
            application_server_key,
        })
        .await?;

    let body = serde_json::to_string(&subscription)?;
    let res = platform.post_json(SUBSCRIBE_PATH, body).await?;
    if !res.is_success() {
        return Err(PushError::Http {
            context: "failed to save subscription on server",
            status: res.status,
        });
    }

    log::info!("user is subscribed and subscription saved on server");
    Ok(subscription)
}

pub async fn is_subscribed<P: Platform + ?Sized>(platform: &P) -> Result<bool, PushError> {
    platform.worker_ready().await?;
    Ok(platform.current_subscription().await?.is_some())
}

/// Full activation sequence.
pub async fn activate<P: Platform + ?Sized>(platform: &P) -> Result<PushSubscription, PushError> {
    if !ask_permission(platform).await? {
        return Err(PushError::PermissionDenied);
    }
    register_worker(platform).await?;
    subscribe_user(platform).await
}

/// Click handler body: runs [`activate`] and reports the outcome through an
/// alert.
pub async fn enable_notifications<P: Platform + ?Sized>(platform: &P) {
    match activate(platform).await {
        Ok(_) => platform.alert("Notifications enabled"),
        Err(PushError::PermissionDenied) => platform.alert("Notification permission denied"),
        Err(e) => {
            log::error!("enabling notifications failed: {}", e);
            platform.alert(&format!("Failed to enable notifications: {}", e));
        }
    }
}
