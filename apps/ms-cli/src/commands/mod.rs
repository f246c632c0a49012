// mod.rs — Shared plumbing for msync subcommands: config resolution and
// construction of the remote client and orchestrator.

pub mod ledger;
pub mod plan;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use ms_remote::BeeminderClient;
use ms_sync::{SyncConfig, SyncOrchestrator, SyncSettings};

/// Name of the config file looked up in the working directory.
const LOCAL_CONFIG: &str = "msync.toml";

/// Pick the config file to read: the explicit path, else `./msync.toml`,
/// else `<config dir>/msync/config.toml`. `None` means built-in defaults.
fn config_path(explicit: Option<&Path>, cwd: &Path, config_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = cwd.join(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    config_dir
        .map(|dir| dir.join("msync").join("config.toml"))
        .filter(|p| p.is_file())
}

/// Resolve the effective configuration: file, then environment, then the
/// `--ledger` flag.
pub fn load_config(explicit: Option<&Path>, ledger: Option<&Path>) -> anyhow::Result<SyncConfig> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config_dir = dirs::config_dir();
    let mut config = resolve(explicit, &cwd, config_dir.as_deref(), |key| {
        std::env::var(key).ok()
    })?;
    if let Some(path) = ledger {
        config.ledger.path = path.to_path_buf();
    }
    Ok(config)
}

fn resolve(
    explicit: Option<&Path>,
    cwd: &Path,
    config_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<SyncConfig> {
    let mut config = match config_path(explicit, cwd, config_dir) {
        // An explicitly named file must exist.
        Some(path) if explicit.is_some() => SyncConfig::load(&path)?,
        Some(path) => SyncConfig::load_or_default(&path)?,
        None => SyncConfig::default(),
    };
    config.apply_env(env);
    Ok(config)
}

/// Build the HTTP client from resolved credentials.
pub fn beeminder_client(config: &SyncConfig) -> anyhow::Result<BeeminderClient> {
    let token = config.auth_token()?;
    let client = BeeminderClient::with_base_url(
        config.beeminder.username.as_str(),
        token,
        config.beeminder.base_url.as_str(),
    )
    .context("cannot set up Beeminder client")?;
    Ok(client)
}

/// Wire an orchestrator over `client`, which serves as both the detection
/// source and the tracking goal.
pub fn orchestrator<'a>(
    config: &SyncConfig,
    client: &'a BeeminderClient,
) -> anyhow::Result<SyncOrchestrator<'a>> {
    let rule = config.qualify.rule()?;
    let settings = SyncSettings {
        source_goal: config.beeminder.source_goal.clone(),
        target_goal: config.beeminder.goal.clone(),
        one_per_day: config.qualify.one_per_day,
        lookback: config.qualify.lookback(),
    };
    Ok(SyncOrchestrator::new(
        client,
        client,
        rule,
        settings,
        config.retry.policy(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_no_file_exists() {
        let cwd = TempDir::new().unwrap();
        let config = resolve(None, cwd.path(), None, no_env).unwrap();
        assert_eq!(config.beeminder.goal, "meditate-early");
        assert_eq!(config.ledger.path, PathBuf::from("data/meditation_sot.json"));
    }

    #[test]
    fn local_file_wins_over_user_config_dir() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("msync.toml"), "[beeminder]\ngoal = \"local\"\n").unwrap();
        std::fs::create_dir_all(home.path().join("msync")).unwrap();
        std::fs::write(
            home.path().join("msync/config.toml"),
            "[beeminder]\ngoal = \"user\"\n",
        )
        .unwrap();

        let config = resolve(None, cwd.path(), Some(home.path()), no_env).unwrap();
        assert_eq!(config.beeminder.goal, "local");
    }

    #[test]
    fn user_config_dir_is_used_without_local_file() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join("msync")).unwrap();
        std::fs::write(
            home.path().join("msync/config.toml"),
            "[qualify]\nmin_duration_minutes = 20\n",
        )
        .unwrap();

        let config = resolve(None, cwd.path(), Some(home.path()), no_env).unwrap();
        assert_eq!(config.qualify.min_duration_minutes, 20);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let cwd = TempDir::new().unwrap();
        let missing = cwd.path().join("nope.toml");
        assert!(resolve(Some(&missing), cwd.path(), None, no_env).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("msync.toml"), "[beeminder]\ngoal = \"file\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("BEEMINDER_GOAL_SLUG", "from-env"),
            ("BEEMINDER_AUTH_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();

        let config = resolve(None, cwd.path(), None, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.beeminder.goal, "from-env");
        assert_eq!(config.auth_token().unwrap(), "secret");
    }

    #[test]
    fn client_requires_a_token() {
        let config = SyncConfig::default();
        assert!(beeminder_client(&config).is_err());
    }

    #[test]
    fn orchestrator_rejects_an_inverted_window() {
        let mut config = SyncConfig::default();
        config.beeminder.auth_token = Some("secret".into());
        config.qualify.window_start = "09:00".into();
        config.qualify.window_end = "05:00".into();
        let client = beeminder_client(&config).unwrap();
        assert!(orchestrator(&config, &client).is_err());
    }
}
