//! Bridge configuration
//!
//! Loaded from YAML, TOML, JSON, INI, RON or JSON5 (picked by file
//! extension). `${VAR}` / `$VAR` references are substituted before parsing
//! and `WISP__*` environment variables override file values, with `__`
//! separating nested keys (`WISP__LIMITS__MAX_FUEL=1000000`).

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{BridgeError, BridgeResult};
use crate::projector::DecodeOptions;
use crate::shim::ShimConfig;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "WISP";

const WASM_PAGE_SIZE: u64 = 65536;

/// `${NAME}` (group 1) or bare `$NAME` (group 2)
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)\b)")
        .expect("valid regex")
});

/// Names of everything the host looks up in the guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestAbi {
    pub memory: String,
    pub tag_of: String,
    pub row: String,
    pub string: String,
    pub tag_int: String,
    pub tag_sys: String,
    pub tag_duo: String,
    pub tag_sym: String,
    pub sys_nil: String,
    pub sys_t: String,
    pub alloc: String,
    pub read: String,
    pub eval: String,
    pub initialize: String,
}

impl Default for GuestAbi {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            tag_of: "wisp_tag_of".to_string(),
            row: "wisp_row".to_string(),
            string: "wisp_str".to_string(),
            tag_int: "wisp_tag_int".to_string(),
            tag_sys: "wisp_tag_sys".to_string(),
            tag_duo: "wisp_tag_duo".to_string(),
            tag_sym: "wisp_tag_sym".to_string(),
            sys_nil: "wisp_sys_nil".to_string(),
            sys_t: "wisp_sys_t".to_string(),
            alloc: "wisp_alloc".to_string(),
            read: "wisp_read".to_string(),
            eval: "wisp_eval".to_string(),
            initialize: "_initialize".to_string(),
        }
    }
}

/// Resource limits for the guest store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestLimits {
    /// Maximum linear memory pages (64KB each)
    pub max_memory_pages: u32,
    /// Maximum table elements
    pub max_table_elements: u32,
    /// Fuel budget per bridge; `None` disables metering
    pub max_fuel: Option<u64>,
}

impl Default for GuestLimits {
    fn default() -> Self {
        Self {
            max_memory_pages: 256, // 16MB
            max_table_elements: 10000,
            max_fuel: None,
        }
    }
}

impl GuestLimits {
    pub fn max_memory_bytes(&self) -> u64 {
        u64::from(self.max_memory_pages) * WASM_PAGE_SIZE
    }
}

/// Everything needed to construct a [`crate::Bridge`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Location of the guest binary
    pub guest: PathBuf,
    pub abi: GuestAbi,
    pub shim: ShimConfig,
    pub decode: DecodeOptions,
    pub limits: GuestLimits,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            guest: PathBuf::from("wisp.wasm"),
            abi: GuestAbi::default(),
            shim: ShimConfig::default(),
            decode: DecodeOptions::default(),
            limits: GuestLimits::default(),
        }
    }
}

impl BridgeConfig {
    pub fn new(guest: impl Into<PathBuf>) -> Self {
        Self {
            guest: guest.into(),
            ..Default::default()
        }
    }

    pub fn with_shim(mut self, shim: ShimConfig) -> Self {
        self.shim = shim;
        self
    }

    pub fn with_decode(mut self, decode: DecodeOptions) -> Self {
        self.decode = decode;
        self
    }

    pub fn with_limits(mut self, limits: GuestLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Load from a file, applying `WISP__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;

        let builder = Cfg::builder()
            .add_source(File::from_str(&substitute_env_vars(&content), format))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        Self::build(builder, &path.display().to_string())
    }

    /// Parse from in-memory text in the given format
    pub fn from_str(content: &str, format: FileFormat) -> BridgeResult<Self> {
        let builder =
            Cfg::builder().add_source(File::from_str(&substitute_env_vars(content), format));
        Self::build(builder, "inline config")
    }

    /// Deserialize the merged sources and clamp out-of-range bounds
    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        origin: &str,
    ) -> BridgeResult<Self> {
        let mut parsed: Self = builder
            .build()
            .and_then(Cfg::try_deserialize)
            .map_err(|e| BridgeError::Config(format!("{}: {}", origin, e)))?;
        parsed.decode = parsed.decode.clamped();
        Ok(parsed)
    }
}

/// Pick the config format from the file extension
pub fn detect_format(path: &Path) -> BridgeResult<FileFormat> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Err(BridgeError::Config(format!(
            "{}: no extension to pick a format from",
            path.display()
        )));
    };

    match ext.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        other => Err(BridgeError::Config(format!(
            "{}: unsupported format '{}'",
            path.display(),
            other
        ))),
    }
}

/// Replace `${VAR}` and `$VAR` with environment values; unknown variables
/// are left as written
pub fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
