use crate::consistency::checker::{CheckReport, CheckStatus};
use crate::core::error::EngineError;
use crate::core::state::Engine;
use tracing::info;

// Runs at boot time, and again whenever the embedder suspects external
// tooling touched the data directory.
pub fn run(engine: &Engine) -> Result<CheckReport, EngineError> {
    let report = engine.checker().check()?;

    match report.status {
        CheckStatus::Healthy => {
            info!(details = ?report.details, "Consistency check passed");
        }
        CheckStatus::Reseeded => {
            info!(
                details = ?report.details,
                "Consistency check re-seeded baseline accounts"
            );
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::fingerprint::{EnvironmentSignals, FixedFingerprintSource};
    use crate::core::config::Config;
    use crate::sync::remote::NullRemoteStore;
    use crate::utils::time::FakeClock;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_startup_seeds_then_reports_healthy() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::with_parts(
            Config::for_data_dir(dir.path().to_path_buf()),
            Arc::new(FakeClock::new(1_000)),
            Arc::new(FixedFingerprintSource(EnvironmentSignals {
                surface: "headless".to_string(),
                locale: "en_US".to_string(),
                timezone_offset_minutes: 0,
                agent: "test".to_string(),
            })),
            Arc::new(NullRemoteStore),
        )
        .unwrap();

        let report = run(&engine).unwrap();
        assert_eq!(report.status, CheckStatus::Reseeded);

        let report = run(&engine).unwrap();
        assert_eq!(report.status, CheckStatus::Healthy);

        // The seeded admin can log in with the default credentials
        assert!(engine.login("admin", "admin123").is_success());
    }
}
