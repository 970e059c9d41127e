//! Layered configuration: defaults, then a TOML file, then `PTXINFO_*`
//! environment variables.

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "PTXINFO_";
const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decode with colour channels multiplied by alpha.
    pub premultiply: bool,
    /// Texels printed per face with `--data`; zero prints all of them.
    pub max_texels: usize,
    /// Read buffer per open file handle, in bytes.
    pub buffer_size: usize,
    /// Log filter used when `RUST_LOG` is unset and no `-v` is given.
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { premultiply: false, max_texels: 64, buffer_size: 8 * 1024, log: "warn".to_string() }
    }
}

impl Config {
    /// Load from `path`, or from the platform config directory when no path
    /// is given. An explicit path must exist; the default one may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::ConfigNotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        Self::figment(file.as_deref()).extract().or_raise(|| ErrorKind::Config)
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Reading configuration file");
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ptxinfo").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}
