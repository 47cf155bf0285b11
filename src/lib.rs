pub mod client;
pub mod key;
pub mod logging;
pub mod scheme;
pub mod worker;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;
#[cfg(not(target_arch = "wasm32"))]
pub mod vapid;

#[cfg(target_arch = "wasm32")]
pub mod browser;
#[cfg(target_arch = "wasm32")]
pub mod service_worker;
