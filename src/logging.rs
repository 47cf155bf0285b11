fn base_dispatch() -> fern::Dispatch {
    fern::Dispatch::new()
        .level(log::LevelFilter::Warn)
        .level_for("web_push_enable", log::LevelFilter::Info)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logger() {
    let stderr_config = base_dispatch()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    if let Err(e) = stderr_config.apply() {
        eprintln!("logger already initialized: {}", e);
    }
}

/// Routes `log` records to the browser console. Safe to call from both the
/// page and the worker; only the first call in a context takes effect.
#[cfg(target_arch = "wasm32")]
pub fn init_logger() {
    console_error_panic_hook::set_once();

    let console_config = base_dispatch()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.target(), message))
        })
        .chain(fern::Output::call(|record| {
            let line = wasm_bindgen::JsValue::from_str(&record.args().to_string());
            match record.level() {
                log::Level::Error => web_sys::console::error_1(&line),
                log::Level::Warn => web_sys::console::warn_1(&line),
                log::Level::Info => web_sys::console::info_1(&line),
                _ => web_sys::console::debug_1(&line),
            }
        }));

    // Err only when a logger is already set in this context.
    let _ = console_config.apply();
}
