//! Runtime settings read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present.
//!
//! | Variable                 | Default                 |
//! |--------------------------|-------------------------|
//! | `CSV2BUFR_TEMPLATES`     | unset                   |
//! | `CSV2BUFR_TEMPLATE_DIR`  | `.csv2bufr/templates`   |
//! | `ECCODES_BUFR_FILTER`    | `bufr_filter`           |
//! | `ECCODES_CODES_INFO`     | `codes_info`            |
//! | `ECCODES_BUFR_SAMPLE`    | from `codes_info -s`    |
//! | `CSV2BUFR_PORT`          | `5000`                  |

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Default directory for imported templates (relative to current dir).
pub const DEFAULT_TEMPLATE_DIR: &str = ".csv2bufr/templates";

pub const DEFAULT_PORT: u16 = 5000;

/// Locations of the ecCodes command-line tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EccodesSettings {
    pub bufr_filter: PathBuf,
    pub codes_info: PathBuf,
    /// Explicit BUFR4 sample; located via `codes_info` when unset.
    pub sample: Option<PathBuf>,
}

impl Default for EccodesSettings {
    fn default() -> Self {
        Self {
            bufr_filter: PathBuf::from("bufr_filter"),
            codes_info: PathBuf::from("codes_info"),
            sample: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Extra read-only template directory, searched first.
    pub templates_path: Option<PathBuf>,
    /// Writable template store.
    pub template_dir: PathBuf,
    pub eccodes: EccodesSettings,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            templates_path: None,
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            eccodes: EccodesSettings::default(),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Read settings from the environment, after loading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("CSV2BUFR_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "ignoring invalid CSV2BUFR_PORT");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            templates_path: get("CSV2BUFR_TEMPLATES").map(PathBuf::from),
            template_dir: get("CSV2BUFR_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            eccodes: EccodesSettings {
                bufr_filter: get("ECCODES_BUFR_FILTER")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.eccodes.bufr_filter),
                codes_info: get("ECCODES_CODES_INFO")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.eccodes.codes_info),
                sample: get("ECCODES_BUFR_SAMPLE").map(PathBuf::from),
            },
            port,
        }
    }
}
