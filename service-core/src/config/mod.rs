use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;

/// Load a service configuration from `configuration.*` and the environment.
///
/// Environment variables use `<PREFIX>__SECTION__KEY`. Keys named in
/// `list_keys` are parsed as comma separated lists.
pub fn load<T: DeserializeOwned>(env_prefix: &str, list_keys: &[&str]) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let mut environment = Environment::with_prefix(env_prefix)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true);

    if !list_keys.is_empty() {
        environment = environment.list_separator(",");
        for key in list_keys {
            environment = environment.with_list_parse_key(key);
        }
    }

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(environment)
        .build()?;

    Ok(config.try_deserialize()?)
}
