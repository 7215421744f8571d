use crate::auth::hash::{rolling_hash, to_base36};

/// Environment signals feeding the device fingerprint. None of these are
/// trusted; the fingerprint is a bookkeeping aid for device listings, not
/// a security boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSignals {
    /// Rendering surface descriptor, e.g. "1920x1080x24"
    pub surface: String,
    pub locale: String,
    pub timezone_offset_minutes: i32,
    pub agent: String,
}

impl EnvironmentSignals {
    fn joined(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.surface, self.locale, self.timezone_offset_minutes, self.agent
        )
    }
}

/// Source of the current environment's signals. Injected into the engine so
/// tests can pin a fixed environment.
pub trait FingerprintSource: Send + Sync {
    fn signals(&self) -> EnvironmentSignals;
}

/// Derive the stable pseudo-identifier for an environment. Stateless:
/// the same signals always produce the same id.
pub fn fingerprint(source: &dyn FingerprintSource) -> String {
    let signals = source.signals();
    format!("fp-{}", to_base36(rolling_hash(&signals.joined()) as u64))
}

/// Signals read from the running process environment. Headless processes
/// have no rendering surface, so a fixed descriptor stands in for it.
pub struct SystemFingerprintSource;

impl FingerprintSource for SystemFingerprintSource {
    fn signals(&self) -> EnvironmentSignals {
        EnvironmentSignals {
            surface: "headless".to_string(),
            locale: std::env::var("LANG").unwrap_or_else(|_| "en_US".to_string()),
            timezone_offset_minutes: 0,
            agent: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Fixed-signal source for tests.
pub struct FixedFingerprintSource(pub EnvironmentSignals);

impl FingerprintSource for FixedFingerprintSource {
    fn signals(&self) -> EnvironmentSignals {
        self.0.clone()
    }
}
