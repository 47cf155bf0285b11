//! Background worker: renders pushed notifications and handles clicks.
//!
//! One implementation serves every worker script; what differs between them
//! (fallback strings, icon, click-through target) lives in [`WorkerConfig`].

use async_trait::async_trait;

use crate::scheme::PushMessage;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("showing notification failed: {0}")]
    Show(String),
    #[error("listing window clients failed: {0}")]
    Clients(String),
    #[error("focusing window failed: {0}")]
    Focus(String),
    #[error("opening window failed: {0}")]
    Open(String),
    #[error("service worker already installed")]
    AlreadyInstalled,
    #[error("invalid click target `{0}`: {1}")]
    Url(String, url::ParseError),
    #[error("unknown worker preset `{0}`")]
    UnknownPreset(String),
}

/// Where a click on a notification leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    /// The `url` field of the push payload, or `default` when it has none.
    Payload { default: String },
    /// Always the same path, whatever the payload says.
    Fixed(String),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub default_title: String,
    pub default_body: String,
    /// Title used when the payload is not JSON and its text becomes the body.
    pub fallback_title: String,
    pub icon: Option<String>,
    pub click_target: ClickTarget,
}

impl WorkerConfig {
    /// Settings of `/service-worker.js`.
    pub fn generic() -> Self {
        Self {
            default_title: "Notification".to_string(),
            default_body: "You have a new message".to_string(),
            fallback_title: "Notification".to_string(),
            icon: None,
            click_target: ClickTarget::Payload {
                default: "/".to_string(),
            },
        }
    }

    /// Settings of `/sw.js`, which always leads to the department dashboard.
    pub fn dashboard() -> Self {
        Self {
            default_title: "New Notification".to_string(),
            default_body: "You have a new message.".to_string(),
            fallback_title: "Browser Test Notification".to_string(),
            icon: Some("/static/images/notification-icon.png".to_string()),
            click_target: ClickTarget::Fixed("/dashboard_kajur".to_string()),
        }
    }

    pub fn from_preset(name: &str) -> Result<Self, WorkerError> {
        match name {
            "generic" => Ok(Self::generic()),
            "dashboard" => Ok(Self::dashboard()),
            other => Err(WorkerError::UnknownPreset(other.to_string())),
        }
    }

    fn target_for(&self, requested: Option<String>) -> String {
        match &self.click_target {
            ClickTarget::Payload { default } => requested.unwrap_or_else(|| default.clone()),
            ClickTarget::Fixed(path) => path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Attached to the notification as `data.url`.
    pub url: String,
}

/// Turns an optional push payload into the notification to display.
pub fn resolve_notification(config: &WorkerConfig, payload: Option<&str>) -> NotificationSpec {
    let (title, body, url) = match payload {
        None => (None, None, None),
        Some(text) => match serde_json::from_str::<PushMessage>(text) {
            Ok(msg) => (msg.title, msg.body, msg.url),
            Err(e) => {
                log::debug!("push payload is not JSON ({}), showing it as text", e);
                (
                    Some(config.fallback_title.clone()),
                    Some(text.to_string()),
                    None,
                )
            }
        },
    };

    NotificationSpec {
        title: title.unwrap_or_else(|| config.default_title.clone()),
        body: body.unwrap_or_else(|| config.default_body.clone()),
        icon: config.icon.clone(),
        url: config.target_for(url),
    }
}

/// Resolves `target` against `base` the way `clients.openWindow` does.
pub fn resolve_url(base: &str, target: &str) -> Result<String, WorkerError> {
    let resolved = url::Url::parse(base)
        .and_then(|base| base.join(target))
        .map_err(|e| WorkerError::Url(target.to_string(), e))?;
    Ok(resolved.into())
}

pub trait WindowClient {
    fn url(&self) -> String;
}

/// The notification a click event refers to.
pub trait ClickedNotification {
    fn close(&self);
    /// `data.url` of the notification, if set.
    fn url(&self) -> Option<String>;
}

/// Worker global scope operations used by the handlers.
#[async_trait(?Send)]
pub trait WorkerHost {
    type Client: WindowClient;

    /// URL of the worker script; relative click targets resolve against it.
    fn base_url(&self) -> String;

    async fn show_notification(&self, spec: &NotificationSpec) -> Result<(), WorkerError>;

    /// All window clients, uncontrolled ones included.
    async fn window_clients(&self) -> Result<Vec<Self::Client>, WorkerError>;

    async fn focus(&self, client: &Self::Client) -> Result<(), WorkerError>;

    async fn open_window(&self, url: &str) -> Result<(), WorkerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(String),
    Opened(String),
}

pub struct ServiceWorker<H> {
    config: WorkerConfig,
    host: H,
}

impl<H: WorkerHost> ServiceWorker<H> {
    pub fn new(config: WorkerConfig, host: H) -> Self {
        Self { config, host }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn on_push(&self, payload: Option<&str>) -> Result<NotificationSpec, WorkerError> {
        log::info!("push received");
        let spec = resolve_notification(&self.config, payload);
        self.host.show_notification(&spec).await?;
        Ok(spec)
    }

    pub async fn on_notification_click<N: ClickedNotification + ?Sized>(
        &self,
        notification: &N,
    ) -> Result<ClickOutcome, WorkerError> {
        log::info!("notification clicked");
        notification.close();

        let target = self.config.target_for(notification.url());
        let target = resolve_url(&self.host.base_url(), &target)?;

        let clients = self.host.window_clients().await?;
        if let Some(client) = clients.iter().find(|c| c.url() == target) {
            self.host.focus(client).await?;
            return Ok(ClickOutcome::Focused(target));
        }

        self.host.open_window(&target).await?;
        Ok(ClickOutcome::Opened(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    const ORIGIN: &str = "https://campus.example.ac.id";

    #[derive(Debug, Clone)]
    struct Tab(String);

    impl WindowClient for Tab {
        fn url(&self) -> String {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MockHost {
        tabs: Vec<Tab>,
        show_fails: bool,
        shown: RefCell<Vec<NotificationSpec>>,
        focused: RefCell<Vec<String>>,
        opened: RefCell<Vec<String>>,
    }

    #[async_trait(?Send)]
    impl WorkerHost for MockHost {
        type Client = Tab;

        fn base_url(&self) -> String {
            format!("{ORIGIN}/service-worker.js")
        }

        async fn show_notification(&self, spec: &NotificationSpec) -> Result<(), WorkerError> {
            if self.show_fails {
                return Err(WorkerError::Show("permission revoked".to_string()));
            }
            self.shown.borrow_mut().push(spec.clone());
            Ok(())
        }

        async fn window_clients(&self) -> Result<Vec<Tab>, WorkerError> {
            Ok(self.tabs.clone())
        }

        async fn focus(&self, client: &Tab) -> Result<(), WorkerError> {
            self.focused.borrow_mut().push(client.0.clone());
            Ok(())
        }

        async fn open_window(&self, url: &str) -> Result<(), WorkerError> {
            self.opened.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    struct Shown {
        url: Option<String>,
        closed: Cell<bool>,
    }

    impl Shown {
        fn with_url(url: Option<&str>) -> Self {
            Self {
                url: url.map(str::to_string),
                closed: Cell::new(false),
            }
        }
    }

    impl ClickedNotification for Shown {
        fn close(&self) {
            self.closed.set(true);
        }

        fn url(&self) -> Option<String> {
            self.url.clone()
        }
    }

    #[test]
    fn json_payload() {
        let spec = resolve_notification(
            &WorkerConfig::generic(),
            Some(r#"{"title":"Leave approved","body":"Your request was approved","url":"/leave/12"}"#),
        );
        assert_eq!(spec.title, "Leave approved");
        assert_eq!(spec.body, "Your request was approved");
        assert_eq!(spec.url, "/leave/12");
        assert_eq!(spec.icon, None);
    }

    #[test]
    fn malformed_payload_falls_back_to_text() {
        let spec = resolve_notification(&WorkerConfig::generic(), Some("Test push from devtools"));
        assert_eq!(spec.title, "Notification");
        assert_eq!(spec.body, "Test push from devtools");
        assert_eq!(spec.url, "/");

        let spec = resolve_notification(&WorkerConfig::dashboard(), Some("{not json"));
        assert_eq!(spec.title, "Browser Test Notification");
        assert_eq!(spec.body, "{not json");
    }

    #[test]
    fn non_object_json_is_treated_as_text() {
        let spec = resolve_notification(&WorkerConfig::generic(), Some("42"));
        assert_eq!(spec.body, "42");
    }

    #[test]
    fn absent_payload_uses_defaults() {
        let spec = resolve_notification(&WorkerConfig::generic(), None);
        assert_eq!(spec.title, "Notification");
        assert_eq!(spec.body, "You have a new message");
        assert_eq!(spec.url, "/");
    }

    #[test]
    fn partial_payload_uses_defaults_for_missing_fields() {
        let spec = resolve_notification(&WorkerConfig::dashboard(), Some(r#"{"body":"New leave request"}"#));
        assert_eq!(spec.title, "New Notification");
        assert_eq!(spec.body, "New leave request");
        assert_eq!(
            spec.icon.as_deref(),
            Some("/static/images/notification-icon.png")
        );
    }

    #[test]
    fn fixed_target_ignores_payload_url() {
        let spec = resolve_notification(
            &WorkerConfig::dashboard(),
            Some(r#"{"title":"t","body":"b","url":"/elsewhere"}"#),
        );
        assert_eq!(spec.url, "/dashboard_kajur");
    }

    #[test]
    fn presets_by_name() {
        assert_eq!(
            WorkerConfig::from_preset("dashboard").unwrap().click_target,
            ClickTarget::Fixed("/dashboard_kajur".to_string())
        );
        assert!(matches!(
            WorkerConfig::from_preset("legacy"),
            Err(WorkerError::UnknownPreset(_))
        ));
    }

    #[test]
    fn click_targets_resolve_like_open_window() {
        let base = format!("{ORIGIN}/service-worker.js");
        assert_eq!(resolve_url(&base, "/").unwrap(), format!("{ORIGIN}/"));
        assert_eq!(resolve_url(&base, "/dashboard_kajur").unwrap(), format!("{ORIGIN}/dashboard_kajur"));
        assert_eq!(resolve_url(&base, "leave/12").unwrap(), format!("{ORIGIN}/leave/12"));
        assert_eq!(
            resolve_url(&base, "//other.test/page").unwrap(),
            "https://other.test/page"
        );
        assert_eq!(
            resolve_url(&base, "https://other.test/page").unwrap(),
            "https://other.test/page"
        );
    }

    #[test]
    fn unresolvable_click_target() {
        assert!(matches!(
            resolve_url(&format!("{ORIGIN}/sw.js"), "https://[bad"),
            Err(WorkerError::Url(..))
        ));
    }

    #[test]
    fn dashboard_absent_payload_uses_defaults() {
        let spec = resolve_notification(&WorkerConfig::dashboard(), None);
        assert_eq!(spec.title, "New Notification");
        assert_eq!(spec.body, "You have a new message.");
        assert_eq!(spec.url, "/dashboard_kajur");
        assert_eq!(
            spec.icon.as_deref(),
            Some("/static/images/notification-icon.png")
        );
    }

    #[tokio::test]
    async fn show_failure_reaches_caller() {
        let host = MockHost {
            show_fails: true,
            ..Default::default()
        };
        let worker = ServiceWorker::new(WorkerConfig::generic(), host);

        let err = worker.on_push(Some("hello")).await.unwrap_err();

        assert!(matches!(err, WorkerError::Show(_)));
        assert!(worker.host.shown.borrow().is_empty());
    }

    #[tokio::test]
    async fn relative_payload_url_matches_open_tab() {
        let host = MockHost {
            tabs: vec![Tab(format!("{ORIGIN}/leave/12"))],
            ..Default::default()
        };
        let worker = ServiceWorker::new(WorkerConfig::generic(), host);

        let outcome = worker
            .on_notification_click(&Shown::with_url(Some("leave/12")))
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Focused(format!("{ORIGIN}/leave/12")));
        assert!(worker.host.opened.borrow().is_empty());
    }

    #[tokio::test]
    async fn push_shows_one_notification() {
        let worker = ServiceWorker::new(WorkerConfig::generic(), MockHost::default());
        worker.on_push(Some("plain")).await.unwrap();
        let shown = worker.host.shown.borrow();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "plain");
    }

    #[tokio::test]
    async fn click_focuses_open_window() {
        let host = MockHost {
            tabs: vec![
                Tab(format!("{ORIGIN}/profile")),
                Tab(format!("{ORIGIN}/leave/12")),
            ],
            ..Default::default()
        };
        let worker = ServiceWorker::new(WorkerConfig::generic(), host);
        let notification = Shown::with_url(Some("/leave/12"));

        let outcome = worker.on_notification_click(&notification).await.unwrap();

        assert_eq!(outcome, ClickOutcome::Focused(format!("{ORIGIN}/leave/12")));
        assert!(notification.closed.get());
        assert_eq!(*worker.host.focused.borrow(), vec![format!("{ORIGIN}/leave/12")]);
        assert!(worker.host.opened.borrow().is_empty());
    }

    #[tokio::test]
    async fn click_opens_exactly_one_window_otherwise() {
        let host = MockHost {
            tabs: vec![Tab(format!("{ORIGIN}/profile"))],
            ..Default::default()
        };
        let worker = ServiceWorker::new(WorkerConfig::generic(), host);
        let notification = Shown::with_url(None);

        let outcome = worker.on_notification_click(&notification).await.unwrap();

        assert_eq!(outcome, ClickOutcome::Opened(format!("{ORIGIN}/")));
        assert!(notification.closed.get());
        assert!(worker.host.focused.borrow().is_empty());
        assert_eq!(*worker.host.opened.borrow(), vec![format!("{ORIGIN}/")]);
    }

    #[tokio::test]
    async fn dashboard_click_goes_to_dashboard() {
        let host = MockHost {
            tabs: vec![Tab(format!("{ORIGIN}/dashboard_kajur"))],
            ..Default::default()
        };
        let worker = ServiceWorker::new(WorkerConfig::dashboard(), host);

        let outcome = worker
            .on_notification_click(&Shown::with_url(Some("/ignored")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ClickOutcome::Focused(format!("{ORIGIN}/dashboard_kajur"))
        );
        assert!(worker.host.opened.borrow().is_empty());
    }
}
