use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where per-sender certificates and signing keys live on disk.
///
/// Files are named after the sender comp ID: `<dir>/<sender>.<ext>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "d_dir")]
    pub dir: PathBuf,
    #[serde(default = "d_cert_ext")]
    pub certificate_extension: String,
    #[serde(default = "d_key_ext")]
    pub key_extension: String,
    /// TLS keystore extension; its presence turns on TLS for the session.
    #[serde(default = "d_keystore_ext")]
    pub keystore_extension: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: d_dir(),
            certificate_extension: d_cert_ext(),
            key_extension: d_key_ext(),
            keystore_extension: d_keystore_ext(),
        }
    }
}

impl CredentialsConfig {
    pub fn certificate_path(&self, sender: &str) -> PathBuf {
        self.file(sender, &self.certificate_extension)
    }

    pub fn key_path(&self, sender: &str) -> PathBuf {
        self.file(sender, &self.key_extension)
    }

    pub fn keystore_path(&self, sender: &str) -> PathBuf {
        self.file(sender, &self.keystore_extension)
    }

    fn file(&self, sender: &str, ext: &str) -> PathBuf {
        Path::new(&self.dir).join(format!("{sender}.{ext}"))
    }
}

fn d_dir() -> PathBuf {
    PathBuf::from("certs")
}
fn d_cert_ext() -> String {
    "cer".into()
}
fn d_key_ext() -> String {
    "key".into()
}
fn d_keystore_ext() -> String {
    "p12".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_named_after_sender() {
        let cfg = CredentialsConfig::default();
        assert_eq!(cfg.certificate_path("INIT1"), PathBuf::from("certs/INIT1.cer"));
        assert_eq!(cfg.key_path("INIT1"), PathBuf::from("certs/INIT1.key"));
        assert_eq!(cfg.keystore_path("INIT1"), PathBuf::from("certs/INIT1.p12"));
    }
}
