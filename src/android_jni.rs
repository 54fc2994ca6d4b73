//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in RustBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.

use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;

use crate::polyline;

/// Returns the library version.
/// Maps to: RustBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_walkguide_app_RustBridge_version(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    env.new_string(crate::VERSION)
        .map(|s| s.into_raw())
        .unwrap_or(std::ptr::null_mut())
}

/// Installs the logcat logger. Safe to call more than once.
/// Maps to: RustBridge.initLogging()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_walkguide_app_RustBridge_initLogging(
    _env: JNIEnv,
    _class: JClass,
) {
    crate::logging::init(log::LevelFilter::Info);
}

/// Decodes an encoded polyline to a JSON array of `{lat, lon}` objects.
/// Maps to: RustBridge.decodePolyline(encoded: String) -> String
///
/// Throws IllegalArgumentException for malformed input.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_walkguide_app_RustBridge_decodePolyline(
    mut env: JNIEnv,
    _class: JClass,
    encoded: JString,
) -> jstring {
    let encoded: String = match env.get_string(&encoded) {
        Ok(s) => s.into(),
        Err(e) => return throw(&mut env, &format!("invalid string argument: {e}")),
    };

    match decode_to_json(&encoded) {
        Ok(json) => env
            .new_string(json)
            .map(|s| s.into_raw())
            .unwrap_or(std::ptr::null_mut()),
        Err(message) => throw(&mut env, &message),
    }
}

/// Decode a polyline and serialize the points for the host.
pub fn decode_to_json(encoded: &str) -> Result<String, String> {
    let points = polyline::decode(encoded).map_err(|e| e.to_string())?;
    serde_json::to_string(&points).map_err(|e| format!("JSON serialize error: {e}"))
}

fn throw(env: &mut JNIEnv, message: &str) -> jstring {
    log::warn!("RustBridge call failed: {message}");
    let thrown = env.throw_new("java/lang/IllegalArgumentException", message);
    check_thrown(thrown, message);
    std::ptr::null_mut()
}

/// Returns whether the exception reached the JVM, logging when it did not.
fn check_thrown(result: jni::errors::Result<()>, message: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to throw IllegalArgumentException ({message}): {e}");
            false
        }
    }
}
