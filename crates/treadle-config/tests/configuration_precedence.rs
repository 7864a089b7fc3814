use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use treadle_config::{
    Config, DEFAULT_INTERNAL_PREFIX, DEFAULT_SESSION_NAME, default_log_filter, default_log_format,
    default_max_loop, default_middlewares,
};

const MAX_LOOP_ENV: &str = "TREADLE_MAX_LOOP";

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

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
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("treadle")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env_guard: guard,
        }
    }

    fn write_config(&self, body: &str) {
        let path = self.temp_dir.path().join("treadle.toml");
        if let Err(error) = fs::write(&path, body) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe in edition 2024; the harness holds the
        // process-wide mutex and restores overrides in `Drop`.
        unsafe { std::env::set_var(key, value) };
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
            if let Some(os_value) = value {
                unsafe { std::env::set_var(&key, os_value) };
            } else {
                unsafe { std::env::remove_var(&key) };
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting max_loop to \"{value}\"")]
fn given_configuration_file(harness: &Harness, value: String) {
    harness.write_config(&format!("max_loop = {value}\n"));
}

#[given("the environment overrides max_loop to \"{value}\"")]
fn given_environment_override(harness: &Harness, value: String) {
    harness.set_env(MAX_LOOP_ENV, &value);
}

#[when("the CLI sets max_loop to \"{value}\"")]
fn when_cli_override(harness: &Harness, value: String) {
    harness.push_cli_arg("--max-loop");
    harness.push_cli_arg(value);
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves max_loop to \"{value}\"")]
fn then_resolved_max_loop(harness: &Harness, value: String) {
    let expected = match value.parse::<usize>() {
        Ok(parsed) => parsed,
        Err(error) => panic!("invalid expected max_loop '{value}': {error}"),
    };
    assert_eq!(harness.loaded_config().max_loop, expected);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();

    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.max_loop, default_max_loop());
    assert_eq!(config.internal_prefix, DEFAULT_INTERNAL_PREFIX);
    assert_eq!(config.middlewares(), default_middlewares().as_slice());
    assert_eq!(config.session_name, DEFAULT_SESSION_NAME);
    assert_eq!(config.error_handler(), None);
    assert!(!config.catch_exceptions);
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
