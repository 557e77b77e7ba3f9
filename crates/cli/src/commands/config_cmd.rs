//! `stepwise config` — Configuration management commands.

use std::path::Path;
use stepwise_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            println!();
            println!("   Agent:     {}", config.agent);
            println!("   Model:     {}", config.default_model);
            println!("   History:   {} tokens", config.history.max_tokens);
            println!("   Timeout:   {}s", config.engine.timeout_secs);
            println!("   Database:  {}", config.query.database_path);
            if !Path::new(&config.query.database_path).exists() {
                println!();
                println!("   warning: database file does not exist yet");
            }
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path(&AppConfig::config_dir()).display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = config_path(&dir);
    if write_default(&dir)? {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists", path.display());
    }
    Ok(())
}

fn config_path(dir: &Path) -> std::path::PathBuf {
    dir.join("config.toml")
}

/// Write the default config into `dir`. Returns false if one is already there.
fn write_default(dir: &Path) -> std::io::Result<bool> {
    let path = config_path(dir);
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = config_path(&AppConfig::config_dir());
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn init_writes_loadable_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join(".stepwise");

        assert!(write_default(&nested).unwrap());
        assert!(!write_default(&nested).unwrap());

        let config = AppConfig::load_from(&config_path(&nested)).unwrap();
        assert_eq!(config.agent, "tool_router");
    }
}
