//! Logger setup.
//!
//! Android builds log to logcat under the `walkguide` tag; every other
//! target goes through `env_logger` (respecting `RUST_LOG`). Calling
//! `init` more than once is harmless.

use log::LevelFilter;

pub const LOG_TAG: &str = "walkguide";

#[cfg(target_os = "android")]
pub fn init(level: LevelFilter) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag(LOG_TAG),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
