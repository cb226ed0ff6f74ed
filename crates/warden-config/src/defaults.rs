use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

/// Directory name created under the user's home directory.
pub const HOME_DIR_NAME: &str = ".warden";

/// Log filter used by the daemon when debug logging is off.
pub const DEFAULT_DAEMON_LOG_FILTER: &str = "info";

/// Log filter used by the client when debug logging is off.
pub const DEFAULT_CLIENT_LOG_FILTER: &str = "warn";

/// Log filter used by both binaries when debug logging is on.
pub const DEBUG_LOG_FILTER: &str = "debug";

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Computes the default home directory (`$HOME/.warden`).
///
/// Falls back to a per-user directory under the system temporary directory
/// when the home directory cannot be determined or is not valid UTF-8.
pub fn default_home_dir() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map(|home| home.join(HOME_DIR_NAME))
        .unwrap_or_else(fallback_home_dir)
}

fn fallback_home_dir() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    let mut base =
        Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    base.push("warden");
    #[cfg(unix)]
    base.push(user_namespace());
    base
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
