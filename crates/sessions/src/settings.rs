//! Builds per-session engine settings from the environment catalog and the
//! static `[engine]` defaults.

use std::path::PathBuf;

use fr_domain::config::{ConfigLookup, CredentialsConfig, EngineDefaults};
use fr_domain::error::{Error, Result};

use crate::engine::{EngineConfig, TlsSettings};
use crate::session_key::{SessionKey, WireSessionId};

pub fn build_engine_config(
    lookup: &dyn ConfigLookup,
    defaults: &EngineDefaults,
    credentials: &CredentialsConfig,
    key: &SessionKey,
) -> Result<EngineConfig> {
    if !lookup.is_valid(&key.env, &key.target, &key.sender) {
        return Err(Error::ConfigInvalid(format!(
            "{} is not an enabled initiator in environment {}",
            key.sender, key.env
        )));
    }

    let port = match lookup.port(&key.env) {
        Some(p) if p > 0 => p,
        _ => {
            return Err(Error::ConfigInvalid(format!(
                "environment {} has no connection port",
                key.env
            )))
        }
    };
    let host = lookup
        .address(&key.env)
        .unwrap_or_else(|| defaults.default_host.clone());

    let keystore_path = credentials.keystore_path(&key.sender);
    let tls = if keystore_path.exists() {
        let password = lookup.password(&key.env, &key.sender);
        if password.is_none() {
            tracing::warn!(
                sender = %key.sender,
                env = %key.env,
                keystore = %keystore_path.display(),
                "keystore found but no password configured"
            );
        }
        Some(TlsSettings {
            keystore_path,
            password,
        })
    } else {
        None
    };

    Ok(EngineConfig {
        session: WireSessionId::from_key(&defaults.begin_string, key),
        host,
        port,
        heartbeat_secs: defaults.heartbeat_secs,
        reconnect_secs: defaults.reconnect_secs,
        start_time: defaults.start_time.clone(),
        end_time: defaults.end_time.clone(),
        use_data_dictionary: defaults.use_data_dictionary,
        data_dictionary: defaults.data_dictionary.clone(),
        validate_user_defined_fields: defaults.validate_user_defined_fields,
        file_store_path: PathBuf::from(&defaults.file_store_path),
        file_log_path: PathBuf::from(&defaults.file_log_path),
        tls,
    })
}
