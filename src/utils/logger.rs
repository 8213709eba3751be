use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the process-wide logger from `RUST_LOG`. Safe to call from
/// every entry point; only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .init();
    });
}
