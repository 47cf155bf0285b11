//! Worker global scope binding for [`crate::worker`].
//!
//! The loader script registers the `push` and `notificationclick` listeners
//! during its first evaluation and hands each event to [`PushWorker`], whose
//! returned promise it passes to `waitUntil`.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Promise, Reflect};
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    ClientQueryOptions, ClientType, NotificationEvent, NotificationOptions, PushEvent,
    ServiceWorkerGlobalScope,
};

use crate::browser::js_message;
use crate::worker::{
    ClickedNotification, NotificationSpec, ServiceWorker, WindowClient, WorkerConfig,
    WorkerError, WorkerHost,
};

thread_local! {
    static INSTALLED: Cell<bool> = const { Cell::new(false) };
}

impl From<WorkerError> for JsValue {
    fn from(err: WorkerError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

pub struct Tab(web_sys::WindowClient);

impl WindowClient for Tab {
    fn url(&self) -> String {
        self.0.url()
    }
}

struct Shown(web_sys::Notification);

impl ClickedNotification for Shown {
    fn close(&self) {
        self.0.close();
    }

    fn url(&self) -> Option<String> {
        Reflect::get(&self.0.data(), &JsValue::from_str("url"))
            .ok()
            .and_then(|v| v.as_string())
    }
}

pub struct ScopeHost {
    scope: ServiceWorkerGlobalScope,
}

#[async_trait(?Send)]
impl WorkerHost for ScopeHost {
    type Client = Tab;

    fn base_url(&self) -> String {
        self.scope.location().href()
    }

    async fn show_notification(&self, spec: &NotificationSpec) -> Result<(), WorkerError> {
        let show_err = |e: JsValue| WorkerError::Show(js_message(&e));

        let data = js_sys::Object::new();
        Reflect::set(&data, &JsValue::from_str("url"), &JsValue::from_str(&spec.url))
            .map_err(show_err)?;

        let options = NotificationOptions::new();
        options.set_body(&spec.body);
        options.set_data(&data);
        if let Some(icon) = &spec.icon {
            options.set_icon(icon);
        }

        let promise = self
            .scope
            .registration()
            .show_notification_with_options(&spec.title, &options)
            .map_err(show_err)?;
        JsFuture::from(promise).await.map_err(show_err)?;
        Ok(())
    }

    async fn window_clients(&self) -> Result<Vec<Tab>, WorkerError> {
        let options = ClientQueryOptions::new();
        options.set_type(ClientType::Window);
        options.set_include_uncontrolled(true);

        let list = JsFuture::from(self.scope.clients().match_all_with_options(&options))
            .await
            .map_err(|e| WorkerError::Clients(js_message(&e)))?;

        Ok(list
            .unchecked_into::<Array>()
            .iter()
            .filter_map(|c| c.dyn_into::<web_sys::WindowClient>().ok())
            .map(Tab)
            .collect())
    }

    async fn focus(&self, client: &Tab) -> Result<(), WorkerError> {
        let focus_err = |e: JsValue| WorkerError::Focus(js_message(&e));
        let promise = client.0.focus().map_err(focus_err)?;
        JsFuture::from(promise).await.map_err(focus_err)?;
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<(), WorkerError> {
        JsFuture::from(self.scope.clients().open_window(url))
            .await
            .map_err(|e| WorkerError::Open(js_message(&e)))?;
        Ok(())
    }
}

#[wasm_bindgen]
pub struct PushWorker {
    inner: Rc<ServiceWorker<ScopeHost>>,
}

#[wasm_bindgen]
impl PushWorker {
    /// Installs the worker with the named preset (`generic` or `dashboard`).
    /// Only the first call in a worker's lifetime succeeds.
    pub fn install(preset: &str) -> Result<PushWorker, JsValue> {
        crate::logging::init_logger();

        let config = WorkerConfig::from_preset(preset)?;
        let scope: ServiceWorkerGlobalScope = js_sys::global()
            .dyn_into()
            .map_err(|_| JsValue::from_str("not running in a service worker"))?;

        if INSTALLED.with(|installed| installed.replace(true)) {
            return Err(WorkerError::AlreadyInstalled.into());
        }
        log::info!("push worker installed with `{}` preset", preset);

        Ok(PushWorker {
            inner: Rc::new(ServiceWorker::new(config, ScopeHost { scope })),
        })
    }

    #[wasm_bindgen(js_name = "onPush")]
    pub fn on_push(&self, event: PushEvent) -> Promise {
        let worker = Rc::clone(&self.inner);
        let payload = event.data().map(|data| data.text());

        future_to_promise(async move {
            worker.on_push(payload.as_deref()).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = "onNotificationClick")]
    pub fn on_notification_click(&self, event: NotificationEvent) -> Promise {
        let worker = Rc::clone(&self.inner);
        let notification = Shown(event.notification());

        future_to_promise(async move {
            worker.on_notification_click(&notification).await?;
            Ok(JsValue::UNDEFINED)
        })
    }
}
