use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::error::{ClientError, Result};
use crate::exchange::signing::MessageLayout;

pub const API_KEY_VAR: &str = "RH_API_KEY";
pub const PRIVATE_KEY_VAR: &str = "RH_PRIVATE_KEY";
pub const DEFAULT_BASE_URL: &str = "https://trading.robinhood.com";
pub const DEFAULT_SYMBOL: &str = "DOGE-USD";
const API_KEY_PREFIX: &str = "rh-api-";

/// Runtime settings. Credentials are loaded separately so they can fail fast.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub symbol: String,
    pub timeout_secs: u64,
    pub layout: MessageLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            timeout_secs: 10,
            layout: MessageLayout::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Plain tunables fall back to defaults; values that would break every
    /// request (unknown layout, zero or unparseable timeout) are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs = match lookup("RH_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ClientError::Configuration(format!(
                        "RH_TIMEOUT_SECS must be a positive integer, got {:?}",
                        raw
                    )))
                }
            },
            None => defaults.timeout_secs,
        };
        let layout = match lookup("RH_MESSAGE_LAYOUT") {
            Some(raw) => raw.parse::<MessageLayout>()?,
            None => defaults.layout,
        };
        Ok(Self {
            base_url: lookup("RH_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            symbol: lookup("RH_SYMBOL")
                .map(|v| v.trim().to_ascii_uppercase())
                .unwrap_or(defaults.symbol),
            timeout_secs,
            layout,
        })
    }

    /// Base asset of the configured pair, e.g. `DOGE` for `DOGE-USD`.
    pub fn asset_code(&self) -> &str {
        self.symbol.split('-').next().unwrap_or(&self.symbol)
    }
}

/// API key id plus the Ed25519 key used to sign requests.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    signing_key: SigningKey,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, signing_key: SigningKey) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::Configuration(format!("{} is empty", API_KEY_VAR)));
        }
        Ok(Self {
            api_key,
            signing_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClientError::Configuration(format!("missing {}", API_KEY_VAR)))?;
        let private_key = lookup(PRIVATE_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClientError::Configuration(format!("missing {}", PRIVATE_KEY_VAR)))?;
        let signing_key = decode_signing_key(&private_key)?;
        Self::new(api_key.trim(), signing_key)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Decode key material given as hex or base64. Accepts a 32-byte seed or a
/// 64-byte seed+public keypair.
pub fn decode_signing_key(raw: &str) -> Result<SigningKey> {
    let bytes = decode_key_material(raw)?;
    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let mut pair = [0u8; 64];
            pair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&pair).map_err(|e| {
                ClientError::Configuration(format!("{} keypair mismatch: {}", PRIVATE_KEY_VAR, e))
            })
        }
        n => Err(ClientError::Configuration(format!(
            "{} must decode to 32 or 64 bytes, got {}",
            PRIVATE_KEY_VAR, n
        ))),
    }
}

fn decode_key_material(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();
    let looks_hex = raw.len() % 2 == 0 && raw.chars().all(|c| c.is_ascii_hexdigit());
    if looks_hex && matches!(raw.len(), 64 | 128) {
        if let Ok(bytes) = hex::decode(raw) {
            return Ok(bytes);
        }
    }
    STANDARD.decode(raw).map_err(|e| {
        ClientError::Configuration(format!("{} is neither hex nor base64: {}", PRIVATE_KEY_VAR, e))
    })
}

/// Read `KEY=value` pairs from a dotenv file without touching the process environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        ClientError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            ClientError::Configuration(format!("bad line in {}: {}", path.display(), e))
        })?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Presence and shape of the credential variables, without exposing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReport {
    pub api_key_present: bool,
    pub api_key_format_ok: bool,
    pub private_key_present: bool,
    pub private_key_decodes: bool,
}

impl CredentialReport {
    pub fn inspect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR).filter(|v| !v.trim().is_empty());
        let private_key = lookup(PRIVATE_KEY_VAR).filter(|v| !v.trim().is_empty());
        Self {
            api_key_present: api_key.is_some(),
            api_key_format_ok: api_key
                .as_deref()
                .map(|k| k.trim().starts_with(API_KEY_PREFIX))
                .unwrap_or(false),
            private_key_present: private_key.is_some(),
            private_key_decodes: private_key
                .as_deref()
                .map(|k| decode_signing_key(k).is_ok())
                .unwrap_or(false),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.api_key_present && self.private_key_present && self.private_key_decodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: [u8; 32] = [7u8; 32];

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.symbol, "DOGE-USD");
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.layout, MessageLayout::Brokerage);
        assert_eq!(cfg.asset_code(), "DOGE");
    }

    #[test]
    fn test_config_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("RH_BASE_URL", "http://localhost:8080/"),
            ("RH_SYMBOL", "BTC-USD"),
            ("RH_TIMEOUT_SECS", "3"),
            ("RH_MESSAGE_LAYOUT", "timestamp-method-path"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080");
        assert_eq!(cfg.asset_code(), "BTC");
        assert_eq!(cfg.timeout_secs, 3);
        assert_eq!(cfg.layout, MessageLayout::TimestampMethodPath);
    }

    #[test]
    fn test_symbol_normalized_to_uppercase() {
        let cfg = Config::from_lookup(lookup_from(&[("RH_SYMBOL", " doge-usd ")])).unwrap();
        assert_eq!(cfg.symbol, "DOGE-USD");
        assert_eq!(cfg.asset_code(), "DOGE");
    }

    #[test]
    fn test_unknown_layout_rejected() {
        let lookup = lookup_from(&[("RH_MESSAGE_LAYOUT", "timestamp_method_path")]);
        let err = Config::from_lookup(lookup).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Configuration(ref m) if m.contains("timestamp_method_path")
        ));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        for raw in ["0", "ten", "-3", ""] {
            let err = Config::from_lookup(lookup_from(&[("RH_TIMEOUT_SECS", raw)])).unwrap_err();
            assert!(
                matches!(err, ClientError::Configuration(ref m) if m.contains("RH_TIMEOUT_SECS")),
                "{:?} accepted",
                raw
            );
        }
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let b64 = STANDARD.encode(SEED);
        let err =
            Credentials::from_lookup(lookup_from(&[(PRIVATE_KEY_VAR, b64.as_str())])).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(ref m) if m.contains(API_KEY_VAR)));
    }

    #[test]
    fn test_missing_private_key_is_configuration_error() {
        let err =
            Credentials::from_lookup(lookup_from(&[(API_KEY_VAR, "rh-api-abc")])).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(ref m) if m.contains(PRIVATE_KEY_VAR)));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let err = Credentials::from_lookup(lookup_from(&[
            (API_KEY_VAR, "  "),
            (PRIVATE_KEY_VAR, "abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_base64_and_hex_seed_decode_to_same_key() {
        let from_b64 = decode_signing_key(&STANDARD.encode(SEED)).unwrap();
        let from_hex = decode_signing_key(&hex::encode(SEED)).unwrap();
        assert_eq!(from_b64.to_bytes(), from_hex.to_bytes());
        assert_eq!(from_b64.to_bytes(), SEED);
    }

    #[test]
    fn test_keypair_bytes_accepted() {
        let key = SigningKey::from_bytes(&SEED);
        let pair = key.to_keypair_bytes();
        let decoded = decode_signing_key(&STANDARD.encode(pair)).unwrap();
        assert_eq!(decoded.to_bytes(), SEED);
    }

    #[test]
    fn test_mismatched_keypair_rejected() {
        let mut pair = SigningKey::from_bytes(&SEED).to_keypair_bytes();
        pair[40] ^= 0xff;
        let err = decode_signing_key(&STANDARD.encode(pair)).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_undecodable_key_rejected() {
        assert!(matches!(
            decode_signing_key("not base64 !!!"),
            Err(ClientError::Configuration(_))
        ));
        assert!(matches!(
            decode_signing_key(&STANDARD.encode([1u8; 16])),
            Err(ClientError::Configuration(ref m)) if m.contains("got 16")
        ));
    }

    #[test]
    fn test_debug_redacts_signing_key() {
        let creds = Credentials::new("rh-api-abc", SigningKey::from_bytes(&SEED)).unwrap();
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains(&hex::encode(SEED)));
    }

    #[test]
    fn test_credential_report() {
        let b64 = STANDARD.encode(SEED);
        let report = CredentialReport::inspect(lookup_from(&[
            (API_KEY_VAR, "rh-api-123"),
            (PRIVATE_KEY_VAR, b64.as_str()),
        ]));
        assert!(report.is_ok());
        assert!(report.api_key_format_ok);

        let report = CredentialReport::inspect(lookup_from(&[(API_KEY_VAR, "other")]));
        assert!(!report.is_ok());
        assert!(report.api_key_present);
        assert!(!report.api_key_format_ok);
        assert!(!report.private_key_present);
    }

    #[test]
    fn test_read_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "RH_API_KEY=rh-api-from-file").unwrap();
        writeln!(file, "RH_PRIVATE_KEY={}", STANDARD.encode(SEED)).unwrap();
        writeln!(file, "# comment").unwrap();
        file.flush().unwrap();

        let vars = read_env_file(file.path()).unwrap();
        assert_eq!(vars.get(API_KEY_VAR).map(String::as_str), Some("rh-api-from-file"));
        let creds = Credentials::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.api_key(), "rh-api-from-file");
        assert_eq!(creds.signing_key().to_bytes(), SEED);
    }

    #[test]
    fn test_read_env_file_missing_path() {
        let err = read_env_file(Path::new("/nonexistent/.env")).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
