//! [`Platform`] backed by the page's `window`, plus the wasm exports the
//! page script calls.

use async_trait::async_trait;
use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Headers, Notification, PushManager, PushSubscriptionOptionsInit, Request, RequestInit,
    Response, ServiceWorkerRegistration, Window,
};

use crate::client::{self, HttpResponse, Permission, Platform, PushError, SubscribeOptions};
use crate::scheme::PushSubscription;

const ENABLE_BUTTON_ID: &str = "btn-enable-push";

impl From<PushError> for JsValue {
    fn from(err: PushError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

pub(crate) fn js_message(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return err.message().into();
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn platform_err(value: JsValue) -> PushError {
    PushError::Platform(js_message(&value))
}

fn network_err(value: JsValue) -> PushError {
    PushError::Network(js_message(&value))
}

pub struct BrowserPlatform {
    window: Window,
}

impl BrowserPlatform {
    pub fn new() -> Result<Self, PushError> {
        let window = web_sys::window()
            .ok_or_else(|| PushError::Platform("no window in this context".to_string()))?;
        Ok(Self { window })
    }

    async fn ready_registration(&self) -> Result<ServiceWorkerRegistration, PushError> {
        if !self.supports_push() {
            return Err(PushError::Unsupported);
        }
        let ready = self
            .window
            .navigator()
            .service_worker()
            .ready()
            .map_err(platform_err)?;
        let registration = JsFuture::from(ready).await.map_err(platform_err)?;
        Ok(registration.unchecked_into())
    }

    async fn push_manager(&self) -> Result<PushManager, PushError> {
        self.ready_registration()
            .await?
            .push_manager()
            .map_err(platform_err)
    }

    async fn fetch(&self, request: &Request) -> Result<HttpResponse, PushError> {
        let res = JsFuture::from(self.window.fetch_with_request(request))
            .await
            .map_err(network_err)?;
        let res: Response = res.dyn_into().map_err(platform_err)?;
        let body = JsFuture::from(res.text().map_err(platform_err)?)
            .await
            .map_err(network_err)?;

        Ok(HttpResponse {
            status: res.status(),
            body: body.as_string().unwrap_or_default(),
        })
    }
}

fn subscription_from_js(value: &JsValue) -> Result<PushSubscription, PushError> {
    // JSON.stringify goes through PushSubscription.toJSON()
    let json: String = js_sys::JSON::stringify(value)
        .map_err(platform_err)?
        .into();
    Ok(serde_json::from_str(&json)?)
}

#[async_trait(?Send)]
impl Platform for BrowserPlatform {
    fn supports_push(&self) -> bool {
        let navigator = self.window.navigator();
        Reflect::has(&navigator, &JsValue::from_str("serviceWorker")).unwrap_or(false)
            && Reflect::has(&self.window, &JsValue::from_str("PushManager")).unwrap_or(false)
    }

    async fn request_permission(&self) -> Result<Permission, PushError> {
        let promise = Notification::request_permission().map_err(|_| PushError::Unsupported)?;
        let outcome = JsFuture::from(promise).await.map_err(platform_err)?;

        Ok(match outcome.as_string().as_deref() {
            Some("granted") => Permission::Granted,
            Some("denied") => Permission::Denied,
            _ => Permission::Default,
        })
    }

    async fn register_worker(&self, script_url: &str) -> Result<(), PushError> {
        let promise = self.window.navigator().service_worker().register(script_url);
        JsFuture::from(promise).await.map_err(|e| {
            log::error!("service worker registration failed: {}", js_message(&e));
            platform_err(e)
        })?;
        Ok(())
    }

    async fn worker_ready(&self) -> Result<(), PushError> {
        self.ready_registration().await.map(|_| ())
    }

    async fn subscribe(&self, options: SubscribeOptions) -> Result<PushSubscription, PushError> {
        let init = PushSubscriptionOptionsInit::new();
        init.set_user_visible_only(options.user_visible_only);
        // nullable union member, set on the dictionary directly
        let key = Uint8Array::from(options.application_server_key.as_slice());
        Reflect::set(&init, &JsValue::from_str("applicationServerKey"), &key)
            .map_err(platform_err)?;

        let promise = self
            .push_manager()
            .await?
            .subscribe_with_options(&init)
            .map_err(platform_err)?;
        let subscription = JsFuture::from(promise).await.map_err(platform_err)?;
        subscription_from_js(&subscription)
    }

    async fn current_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
        let promise = self
            .push_manager()
            .await?
            .get_subscription()
            .map_err(platform_err)?;
        let subscription = JsFuture::from(promise).await.map_err(platform_err)?;
        if subscription.is_null() || subscription.is_undefined() {
            return Ok(None);
        }
        subscription_from_js(&subscription).map(Some)
    }

    async fn get(&self, path: &str) -> Result<HttpResponse, PushError> {
        let request = Request::new_with_str(path).map_err(platform_err)?;
        self.fetch(&request).await
    }

    async fn post_json(&self, path: &str, body: String) -> Result<HttpResponse, PushError> {
        let headers = Headers::new().map_err(platform_err)?;
        headers
            .set("Content-Type", "application/json")
            .map_err(platform_err)?;

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_headers(&headers);
        init.set_body(&JsValue::from_str(&body));

        let request = Request::new_with_str_and_init(path, &init).map_err(platform_err)?;
        self.fetch(&request).await
    }

    fn alert(&self, message: &str) {
        if let Err(e) = self.window.alert_with_message(message) {
            log::warn!("alert failed: {}", js_message(&e));
        }
    }
}

/// Runs the whole activation flow and reports the outcome with an alert.
#[wasm_bindgen]
pub async fn enable_notifications() -> Result<(), JsValue> {
    crate::logging::init_logger();
    let platform = BrowserPlatform::new()?;
    client::enable_notifications(&platform).await;
    Ok(())
}

#[wasm_bindgen]
pub async fn is_subscribed() -> Result<bool, JsValue> {
    crate::logging::init_logger();
    let platform = BrowserPlatform::new()?;
    Ok(client::is_subscribed(&platform).await?)
}

/// Wires the enable button's click to [`enable_notifications`]. Pages
/// without the button are left alone.
#[wasm_bindgen]
pub fn bind_enable_button() -> Result<(), JsValue> {
    crate::logging::init_logger();
    let platform = BrowserPlatform::new()?;
    let document = platform
        .window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if document.ready_state() == "loading" {
        let on_ready = Closure::<dyn FnMut()>::new(|| {
            if let Err(e) = attach_click_handler() {
                log::error!("binding enable button failed: {}", js_message(&e));
            }
        });
        document.add_event_listener_with_callback(
            "DOMContentLoaded",
            on_ready.as_ref().unchecked_ref(),
        )?;
        on_ready.forget();
        Ok(())
    } else {
        attach_click_handler()
    }
}

fn attach_click_handler() -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let Some(button) = document.get_element_by_id(ENABLE_BUTTON_ID) else {
        return Ok(());
    };

    let on_click = Closure::<dyn FnMut()>::new(|| {
        spawn_local(async {
            if let Err(e) = enable_notifications().await {
                log::error!("{}", js_message(&e));
            }
        });
    });
    button.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
    on_click.forget();
    Ok(())
}
