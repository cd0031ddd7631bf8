use facegate_core::{EnrollmentConfig, LivenessConfig, MatcherConfig};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Default distance threshold for a positive match.
    pub matcher: MatcherConfig,
    /// Liveness thresholds handed to the engine.
    pub liveness: LivenessConfig,
    pub enrollment: EnrollmentConfig,
    /// Timeout in seconds for a single engine call.
    pub check_timeout_secs: u64,
    /// Serve on the session bus instead of the system bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = lookup("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("templates.db"));

        let liveness_defaults = LivenessConfig::default();
        let liveness = LivenessConfig {
            blur_threshold: parsed(&lookup, "FACEGATE_BLUR_THRESHOLD")
                .unwrap_or(liveness_defaults.blur_threshold),
            moire_max_energy: parsed(&lookup, "FACEGATE_MOIRE_MAX_ENERGY"),
            glare_ratio_threshold: parsed(&lookup, "FACEGATE_GLARE_RATIO")
                .unwrap_or(liveness_defaults.glare_ratio_threshold),
            eye_ar_threshold: parsed(&lookup, "FACEGATE_EYE_AR_THRESHOLD")
                .unwrap_or(liveness_defaults.eye_ar_threshold),
            require_blink: lookup("FACEGATE_REQUIRE_BLINK")
                .map(|v| v != "0")
                .unwrap_or(liveness_defaults.require_blink),
            ..liveness_defaults
        };

        Self {
            db_path,
            matcher: MatcherConfig {
                threshold: parsed(&lookup, "FACEGATE_MATCH_THRESHOLD")
                    .unwrap_or(MatcherConfig::default().threshold),
            },
            liveness,
            enrollment: EnrollmentConfig {
                min_templates: parsed(&lookup, "FACEGATE_MIN_TEMPLATES")
                    .unwrap_or(EnrollmentConfig::default().min_templates),
            },
            check_timeout_secs: parsed(&lookup, "FACEGATE_CHECK_TIMEOUT_SECS").unwrap_or(10),
            session_bus: lookup("FACEGATE_SESSION_BUS").is_some(),
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}
