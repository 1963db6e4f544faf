use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default pbench data directory: ~/.pbench
pub fn get_pbench_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".pbench"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.pbench/config.toml
    let user_config = get_pbench_data_dir()?.join("config.toml");

    // Priority 2: ./pbench.toml (current directory)
    let local_config = Path::new("pbench.toml");

    let mut cfg = if user_config.exists() {
        load_file(&user_config)?
    } else if local_config.exists() {
        load_file(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&s)?)
}

/// Environment variable overrides (highest priority after CLI flags).
pub fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = non_empty_env("PBENCH_SERVER_URL") {
        cfg.client.server_url = v;
    }
    if let Some(v) = non_empty_env("PBENCH_USER") {
        cfg.client.user = v;
    }
    if let Some(v) = non_empty_env("PBENCH_OUTPUT_ROOT") {
        cfg.run.output_root = Some(v);
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\nuser = \"bench\"\nclient_tags = [\"nightly\"]").unwrap();

        let cfg = load_file(file.path()).unwrap();

        assert_eq!(cfg.client.user, "bench");
        assert_eq!(cfg.client.client_tags, vec!["nightly".to_string()]);
    }

    #[test]
    fn load_file_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client\nuser = ").unwrap();

        assert!(load_file(file.path()).is_err());
    }
}
