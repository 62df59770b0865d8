//! Process-level CLI/env option parsing for the operator-facing binary.
//! Generalized from the teacher's `Opt` (push-model: index/crate
//! directories, a publish key) to this engine's own surface: where the
//! store lives, the queue/name-length overrides `EngineConfig` exposes
//! as configuration (spec.md §9), and an optional mirror URL.

use std::path::PathBuf;
use structopt::StructOpt;

/// Something about the macros used by `structopt` mean the return from
/// `from_args()` is <unknown> in code editors without a type ascription or some
/// other
/// hint. This function provides such a hint.
pub fn parse_args() -> Opt {
    Opt::from_args()
}

#[derive(StructOpt)]
pub struct Opt {
    #[structopt(long, default_value = "0.0.0.0", env = "WHARF_HTTP_HOST")]
    pub http_host: String,

    #[structopt(long, default_value = "7878", env = "WHARF_HTTP_PORT")]
    pub http_port: u16,

    #[structopt(
        long,
        parse(from_os_str),
        env = "WHARF_DATABASE_PATH",
        help = "Path to the SQLite database file backing the package store."
    )]
    pub database_path: PathBuf,

    #[structopt(
        long,
        env = "WHARF_MIRROR_URL",
        help = "Base URL of an upstream registry to mirror from. When set, validated at \
        startup and pullable via `POST /api/v1/mirror/pull`."
    )]
    pub mirror_url: Option<String>,

    #[structopt(
        long,
        default_value = "60",
        env = "WHARF_MAX_NAME_LENGTH",
        help = "Maximum length, in characters, of a canonical package name."
    )]
    pub max_name_length: usize,

    #[structopt(
        long,
        default_value = "10000",
        env = "WHARF_QUEUE_CAPACITY",
        help = "Maximum number of distinct names the update queue will hold."
    )]
    pub queue_capacity: usize,

    #[structopt(
        long,
        default_value = "7200",
        env = "WHARF_WATCHDOG_TIMEOUT_SECS",
        help = "Seconds the drain task's liveness beacon may go unstamped before it is \
        interrupted and restarted."
    )]
    pub watchdog_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_config_defaults() {
        let opt = Opt::from_iter(&["wharf", "--database-path", "/tmp/wharf.sqlite"]);
        assert_eq!(60, opt.max_name_length);
        assert_eq!(10_000, opt.queue_capacity);
        assert_eq!(7200, opt.watchdog_timeout_secs);
        assert_eq!("0.0.0.0", opt.http_host);
        assert_eq!(7878, opt.http_port);
        assert!(opt.mirror_url.is_none());
    }

    #[test]
    fn test_mirror_url_is_parsed_when_given() {
        let opt = Opt::from_iter(&[
            "wharf",
            "--database-path",
            "/tmp/wharf.sqlite",
            "--mirror-url",
            "https://upstream.example.test/",
        ]);
        assert_eq!(Some("https://upstream.example.test/".to_string()), opt.mirror_url);
    }
}
