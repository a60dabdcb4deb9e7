use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for structured overrides, e.g. `WAYPOST__SERVICES__USERS__URL`.
pub const ENV_PREFIX: &str = "WAYPOST";

/// Conventional per-service variables: `<PREFIX>_URL` and `<PREFIX>_TIMEOUT`.
const SERVICE_ENV_VARS: &[(&str, &str)] = &[
    ("users", "USER_SERVICE"),
    ("products", "PRODUCT_SERVICE"),
    ("notes", "NOTES_SERVICE"),
];

/// Load configuration from built-in defaults, an optional file and the
/// process environment.
pub fn load_config(config_path: Option<&str>) -> Result<ServerConfig> {
    load_config_with_env(config_path, std::env::vars().collect())
}

/// Load configuration against an explicit environment map.
///
/// Precedence, lowest first: defaults, config file, `WAYPOST__*` variables,
/// conventional flat variables (`PORT`, `USER_SERVICE_URL`, ...).
pub fn load_config_with_env(
    config_path: Option<&str>,
    env: HashMap<String, String>,
) -> Result<ServerConfig> {
    let defaults = Config::try_from(&ServerConfig::default())
        .wrap_err("Failed to serialize default configuration")?;

    let mut builder = Config::builder().add_source(defaults);

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        let path_str = path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
        builder = builder.add_source(File::new(path_str, file_format(path)));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(env.clone())),
    );

    let lookup = |name: &str| env.get(name).filter(|v| !v.trim().is_empty()).cloned();

    builder = builder
        .set_override_option("host", lookup("HOST"))?
        .set_override_option("port", lookup("PORT"))?
        .set_override_option("request_timeout", lookup("REQUEST_TIMEOUT"))?;

    for (key, var_prefix) in SERVICE_ENV_VARS {
        builder = builder
            .set_override_option(
                format!("services.{key}.url"),
                lookup(&format!("{var_prefix}_URL")),
            )?
            .set_override_option(
                format!("services.{key}.timeout"),
                lookup(&format!("{var_prefix}_TIMEOUT")),
            )?;
    }

    let settings = builder.build().with_context(|| match config_path {
        Some(p) => format!("Failed to build config from {p}"),
        None => "Failed to build config from environment".to_string(),
    })?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize gateway configuration")?;

    Ok(server_config)
}

/// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}
