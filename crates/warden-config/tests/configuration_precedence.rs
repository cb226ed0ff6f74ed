use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use warden_config::{Config, DaemonEndpoint, LogFormat, default_log_format};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const ADDR_VARIABLE: &str = "WARDEN_SERVER_ADDR";

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _env_guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let env_guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let harness = Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("warden")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env_guard: env_guard,
        };
        harness.clear_env(ADDR_VARIABLE);
        harness
    }

    fn write_config(&self, addr: &str) {
        let path = self.temp_dir.path().join("warden.toml");
        if let Err(error) = fs::write(&path, format!("server_addr = \"{addr}\"\n")) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is serialised by `ENV_MUTEX` and undone in `Drop`.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn clear_env(&self, key: &str) {
        let previous = std::env::var_os(key);
        unsafe { std::env::remove_var(key) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(os_value) => unsafe { std::env::set_var(&key, os_value) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

fn parse_endpoint(addr: &str) -> DaemonEndpoint {
    match addr.parse::<DaemonEndpoint>() {
        Ok(endpoint) => endpoint,
        Err(error) => panic!("invalid address '{addr}': {error}"),
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the daemon address to \"{addr}\"")]
fn given_configuration_file(harness: &Harness, addr: String) {
    harness.write_config(&addr);
}

#[given("the environment overrides the daemon address to \"{addr}\"")]
fn given_environment_override(harness: &Harness, addr: String) {
    harness.set_env(ADDR_VARIABLE, &addr);
}

#[when("the CLI sets the daemon address to \"{addr}\"")]
fn when_cli_override(harness: &Harness, addr: String) {
    harness.push_cli_arg("--addr");
    harness.push_cli_arg(OsString::from(&addr));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the daemon address to \"{addr}\"")]
fn then_resolved_addr(harness: &Harness, addr: String) {
    let config = harness.loaded_config();
    let Some(configured) = config.server_addr() else {
        panic!("expected a configured daemon address");
    };
    assert_eq!(parse_endpoint(configured), parse_endpoint(&addr));
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.server_addr(), None);
    assert!(!config.debug());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
