//! Engine configuration.
//!
//! `EngineConfig` holds the tunable limits that would otherwise be
//! literals scattered through the reconciler and the queue, as a single
//! overridable surface (spec.md §9). Process-level settings (bind
//! address, database path, mirror URL) live in `cli::Opt` instead,
//! following the teacher's `structopt`-based `Opt` for the CLI/env
//! surface.

use std::time::Duration;

/// Tunables for the core engine: a 60-character package name cap and a
/// 10,000-entry update queue by default.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum length, in characters, of a canonical package name.
    pub max_name_length: usize,
    /// Maximum number of distinct names the update queue will hold.
    pub queue_capacity: usize,
    /// How long the drain task's liveness beacon may go unstamped before
    /// the next `triggerPackageUpdate` interrupts and restarts it.
    pub watchdog_timeout: Duration,
    /// Recipe filenames probed, in order, by the version-info resolver.
    pub recipe_filenames: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_name_length: 60,
            queue_capacity: 10_000,
            watchdog_timeout: Duration::from_secs(2 * 60 * 60),
            recipe_filenames: vec![
                "package.json".to_string(),
                "module.json".to_string(),
                "recipe.sdl".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config_matches_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(60, config.max_name_length);
        assert_eq!(10_000, config.queue_capacity);
        assert_eq!(Duration::from_secs(7200), config.watchdog_timeout);
    }
}
