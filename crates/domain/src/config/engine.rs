use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session engine defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static initiator settings applied to every engine session.  Per-session
/// values (host, port, comp IDs, TLS) come from the environment catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Which engine implementation the gateway drives.
    #[serde(default)]
    pub kind: EngineKind,
    /// FIX `BeginString` used for every wire session identity.
    #[serde(default = "d_begin_string")]
    pub begin_string: String,
    #[serde(default = "d_30")]
    pub heartbeat_secs: u32,
    #[serde(default = "d_5")]
    pub reconnect_secs: u32,
    #[serde(default = "d_midnight")]
    pub start_time: String,
    #[serde(default = "d_midnight")]
    pub end_time: String,
    #[serde(default = "d_true")]
    pub use_data_dictionary: bool,
    #[serde(default = "d_data_dictionary")]
    pub data_dictionary: String,
    #[serde(default)]
    pub validate_user_defined_fields: bool,
    #[serde(default = "d_file_store_path")]
    pub file_store_path: String,
    #[serde(default = "d_file_log_path")]
    pub file_log_path: String,
    /// Used when an environment has no `connection.address`.
    #[serde(default = "d_default_host")]
    pub default_host: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// In-process engine that logs on immediately (development).
    #[default]
    Loopback,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            begin_string: d_begin_string(),
            heartbeat_secs: d_30(),
            reconnect_secs: d_5(),
            start_time: d_midnight(),
            end_time: d_midnight(),
            use_data_dictionary: true,
            data_dictionary: d_data_dictionary(),
            validate_user_defined_fields: false,
            file_store_path: d_file_store_path(),
            file_log_path: d_file_log_path(),
            default_host: d_default_host(),
        }
    }
}

fn d_begin_string() -> String {
    "FIX.4.4".into()
}
fn d_30() -> u32 {
    30
}
fn d_5() -> u32 {
    5
}
fn d_midnight() -> String {
    "00:00:00".into()
}
fn d_true() -> bool {
    true
}
fn d_data_dictionary() -> String {
    "FIX44.xml".into()
}
fn d_file_store_path() -> String {
    "store/initiator".into()
}
fn d_file_log_path() -> String {
    "log/initiator".into()
}
fn d_default_host() -> String {
    "127.0.0.1".into()
}
