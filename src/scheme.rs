use serde::{Deserialize, Serialize};

/// Platform-issued subscription, kept exactly as `PushSubscription.toJSON()`
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushSubscription(pub serde_json::Value);

impl PushSubscription {
    /// Push service endpoint, the only field the server looks at.
    pub fn endpoint(&self) -> Option<&str> {
        self.0.get("endpoint")?.as_str()
    }
}

/// `GET /vapid_public_key` response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidPublicKey {
    pub public_key: String,
}

/// JSON payload a push may carry. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct StoredSubscription {
    pub id: String,
    pub endpoint: String,
    pub subscription: String,
}
