//! Configuration loader covering the bootstrap failure path.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use treadle_config::Config;

use crate::bootstrap::ConfigLoader;

/// Loader that intentionally fails by passing an invalid CLI argument.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("treadle"),
            OsString::from("--max-loop"),
            OsString::from("many"),
        ];
        Config::load_from_iter(args)
    }
}
