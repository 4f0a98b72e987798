//! Per-sender certificates and signing keys.
//!
//! Lookups are memoized per sender with single-flight loading: concurrent
//! callers for the same sender wait on one disk read.  Misses and load
//! errors are never cached, so a file that appears later is picked up.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use fr_domain::config::{ConfigLookup, CredentialsConfig};
use fr_domain::error::{Error, Result};
use fr_domain::trace::TraceEvent;

type HmacSha256 = Hmac<Sha256>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Material
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A loaded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    base64: String,
}

impl Certificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        let base64 = STANDARD.encode(&der);
        Self { der, base64 }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }
}

/// Signing secret unlocked from a sender's key file.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: Vec<u8>,
}

impl PrivateKey {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Derive the secret from key file contents and its password.
    pub fn unlock(file: &[u8], password: &str) -> Result<Self> {
        let mut mac = HmacSha256::new_from_slice(password.as_bytes())
            .map_err(|e| Error::Other(format!("key derivation: {e}")))?;
        mac.update(file);
        Ok(Self::new(mac.finalize().into_bytes().to_vec()))
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Seams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where credential bytes come from.  `Ok(None)` means "not present".
pub trait CredentialSource: Send + Sync {
    fn load_certificate(&self, sender: &str) -> Result<Option<Vec<u8>>>;
    fn load_private_key(&self, sender: &str, password: &str) -> Result<Option<PrivateKey>>;
}

pub trait MessageSigner: Send + Sync {
    fn sign(&self, message: &[u8], certificate_der: &[u8], key: &PrivateKey) -> Result<String>;
}

/// base64(HMAC-SHA256(key, sha256(certificate) ‖ message)).
#[derive(Debug, Default, Clone, Copy)]
pub struct HmacSigner;

impl MessageSigner for HmacSigner {
    fn sign(&self, message: &[u8], certificate_der: &[u8], key: &PrivateKey) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(key.secret())
            .map_err(|e| Error::SignatureUnavailable(e.to_string()))?;
        mac.update(&Sha256::digest(certificate_der));
        mac.update(message);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reads `<dir>/<sender>.<ext>` files.  Certificates may be PEM or DER.
pub struct FileCredentialSource {
    config: CredentialsConfig,
}

impl FileCredentialSource {
    pub fn new(config: CredentialsConfig) -> Self {
        Self { config }
    }
}

impl CredentialSource for FileCredentialSource {
    fn load_certificate(&self, sender: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = read_optional(&self.config.certificate_path(sender))? else {
            return Ok(None);
        };
        Ok(Some(pem_to_der(&raw)?))
    }

    fn load_private_key(&self, sender: &str, password: &str) -> Result<Option<PrivateKey>> {
        let Some(raw) = read_optional(&self.config.key_path(sender))? else {
            return Ok(None);
        };
        Ok(Some(PrivateKey::unlock(&raw, password)?))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Unwrap a PEM block to DER; anything without a PEM header is taken as
/// DER already.
fn pem_to_der(raw: &[u8]) -> Result<Vec<u8>> {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Ok(raw.to_vec());
    };
    if !text.trim_start().starts_with("-----BEGIN") {
        return Ok(raw.to_vec());
    }
    let body: String = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("-----"))
        .collect();
    STANDARD
        .decode(body)
        .map_err(|e| Error::Other(format!("invalid PEM certificate: {e}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single-flight memo
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Each key maps to its own slot lock; holding it while loading makes
/// concurrent callers for that key wait instead of loading again.
struct Memo<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Memo<T> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_load(&self, key: &str, load: impl FnOnce() -> Option<T>) -> Option<Arc<T>> {
        let slot = self.slots.lock().entry(key.to_owned()).or_default().clone();
        let mut value = slot.lock();
        if let Some(v) = value.as_ref() {
            return Some(v.clone());
        }
        let loaded = Arc::new(load()?);
        *value = Some(loaded.clone());
        Some(loaded)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    lookup: Arc<dyn ConfigLookup>,
    signer: Arc<dyn MessageSigner>,
    certificates: Memo<Certificate>,
    keys: Memo<PrivateKey>,
}

impl CredentialCache {
    pub fn new(
        source: Arc<dyn CredentialSource>,
        lookup: Arc<dyn ConfigLookup>,
        signer: Arc<dyn MessageSigner>,
    ) -> Self {
        Self {
            source,
            lookup,
            signer,
            certificates: Memo::new(),
            keys: Memo::new(),
        }
    }

    pub fn certificate(&self, sender: &str) -> Option<Arc<Certificate>> {
        self.certificates.get_or_load(sender, || {
            match self.source.load_certificate(sender) {
                Ok(Some(der)) => {
                    TraceEvent::CredentialLoaded {
                        sender: sender.to_owned(),
                        kind: "certificate".into(),
                    }
                    .emit();
                    Some(Certificate::from_der(der))
                }
                Ok(None) => {
                    tracing::warn!(sender, "certificate not found");
                    None
                }
                Err(e) => {
                    tracing::warn!(sender, error = %e, "failed to load certificate");
                    None
                }
            }
        })
    }

    /// Base64 DER, as carried on Logon.
    pub fn certificate_base64(&self, sender: &str) -> Option<String> {
        self.certificate(sender).map(|c| c.base64().to_owned())
    }

    pub fn private_key(&self, sender: &str) -> Option<Arc<PrivateKey>> {
        self.keys.get_or_load(sender, || {
            let Some(password) = self.lookup.find_password(sender) else {
                tracing::warn!(sender, "no keystore password configured");
                return None;
            };
            match self.source.load_private_key(sender, &password) {
                Ok(Some(key)) => {
                    TraceEvent::CredentialLoaded {
                        sender: sender.to_owned(),
                        kind: "private_key".into(),
                    }
                    .emit();
                    Some(key)
                }
                Ok(None) => {
                    tracing::warn!(sender, "private key not found");
                    None
                }
                Err(e) => {
                    tracing::warn!(sender, error = %e, "failed to load private key");
                    None
                }
            }
        })
    }

    /// Sign `message` for `sender`.  Fails with `SignatureUnavailable` when
    /// either credential is missing; callers treat that as non-fatal.
    pub fn sign(&self, message: &[u8], sender: &str) -> Result<String> {
        let cert = self
            .certificate(sender)
            .ok_or_else(|| Error::SignatureUnavailable(format!("no certificate for {sender}")))?;
        let key = self
            .private_key(sender)
            .ok_or_else(|| Error::SignatureUnavailable(format!("no private key for {sender}")))?;
        self.signer
            .sign(message, cert.der(), &key)
            .map_err(|e| match e {
                Error::SignatureUnavailable(_) => e,
                other => Error::SignatureUnavailable(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fr_domain::config::{EnvironmentCatalog, EnvironmentConfig, InitiatorConfig};

    fn lookup(password: Option<&str>) -> Arc<dyn ConfigLookup> {
        let mut envs = BTreeMap::new();
        envs.insert(
            "UAT".to_owned(),
            EnvironmentConfig {
                connection: None,
                initiators: vec![InitiatorConfig {
                    sender_comp_id: "S".into(),
                    keystore_password: password.map(str::to_owned),
                    enabled: None,
                }],
            },
        );
        Arc::new(EnvironmentCatalog::from_environments(envs))
    }

    /// Counts loads; returns material only once `present` is set.
    #[derive(Default)]
    struct CountingSource {
        present: std::sync::atomic::AtomicBool,
        cert_loads: AtomicUsize,
        key_loads: AtomicUsize,
    }

    impl CredentialSource for CountingSource {
        fn load_certificate(&self, _sender: &str) -> Result<Option<Vec<u8>>> {
            self.cert_loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(self.present.load(Ordering::SeqCst).then(|| vec![1, 2, 3]))
        }

        fn load_private_key(&self, _sender: &str, password: &str) -> Result<Option<PrivateKey>> {
            self.key_loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .present
                .load(Ordering::SeqCst)
                .then(|| PrivateKey::new(password.as_bytes().to_vec())))
        }
    }

    fn cache(source: Arc<CountingSource>, password: Option<&str>) -> CredentialCache {
        CredentialCache::new(source, lookup(password), Arc::new(HmacSigner))
    }

    #[test]
    fn misses_are_not_cached() {
        let source = Arc::new(CountingSource::default());
        let cache = cache(source.clone(), Some("pw"));

        assert!(cache.certificate("S").is_none());
        assert!(cache.certificate("S").is_none());
        assert_eq!(source.cert_loads.load(Ordering::SeqCst), 2);

        source.present.store(true, Ordering::SeqCst);
        assert_eq!(cache.certificate_base64("S").as_deref(), Some("AQID"));
        assert!(cache.certificate("S").is_some());
        assert_eq!(source.cert_loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_lookups_load_once() {
        let source = Arc::new(CountingSource::default());
        source.present.store(true, Ordering::SeqCst);
        let cache = Arc::new(cache(source.clone(), Some("pw")));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.certificate("S").is_some())
            })
            .collect();
        for t in threads {
            assert!(t.join().unwrap());
        }
        assert_eq!(source.cert_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_password_skips_key_load() {
        let source = Arc::new(CountingSource::default());
        source.present.store(true, Ordering::SeqCst);
        let cache = cache(source.clone(), None);

        assert!(cache.private_key("S").is_none());
        assert_eq!(source.key_loads.load(Ordering::SeqCst), 0);
        assert!(matches!(
            cache.sign(b"msg", "S"),
            Err(Error::SignatureUnavailable(_))
        ));
    }

    #[test]
    fn signature_is_deterministic_and_key_bound() {
        let source = Arc::new(CountingSource::default());
        source.present.store(true, Ordering::SeqCst);
        let a = cache(source.clone(), Some("pw"));
        let b = cache(source, Some("other"));

        let sig = a.sign(b"35=D", "S").unwrap();
        assert_eq!(sig, a.sign(b"35=D", "S").unwrap());
        assert_ne!(sig, a.sign(b"35=F", "S").unwrap());
        assert_ne!(sig, b.sign(b"35=D", "S").unwrap());
        // 32-byte MAC in base64.
        assert_eq!(STANDARD.decode(&sig).unwrap().len(), 32);
    }

    #[test]
    fn file_source_reads_pem_and_der() {
        let dir = tempfile::tempdir().unwrap();
        let config = CredentialsConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let source = FileCredentialSource::new(config);

        assert_eq!(source.load_certificate("S").unwrap(), None);

        std::fs::write(dir.path().join("S.cer"), [0x30, 0x82, 0x01]).unwrap();
        assert_eq!(source.load_certificate("S").unwrap(), Some(vec![0x30, 0x82, 0x01]));

        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        std::fs::write(dir.path().join("P.cer"), pem).unwrap();
        assert_eq!(
            source.load_certificate("P").unwrap(),
            Some(STANDARD.decode("MIIB").unwrap())
        );

        std::fs::write(dir.path().join("S.key"), b"key-bytes").unwrap();
        let key = source.load_private_key("S", "pw").unwrap().unwrap();
        assert_eq!(key, PrivateKey::unlock(b"key-bytes", "pw").unwrap());
        assert_ne!(key, PrivateKey::unlock(b"key-bytes", "nope").unwrap());
        assert_eq!(format!("{key:?}"), "PrivateKey(<redacted>)");
    }

    #[test]
    fn malformed_pem_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("S.cer"),
            "-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        let source = FileCredentialSource::new(CredentialsConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert!(source.load_certificate("S").is_err());
    }
}
