//! Install the host as a systemd user service.

use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use vsf_core::Config;

pub fn unit_path(config: &Config) -> PathBuf {
    config.unit_dir.join(format!("{}.service", config.service_name))
}

/// Render the unit file that runs `exe` as the host.
pub fn render_unit(config: &Config, exe: &Path) -> String {
    format!(
        "# Generated by vsfhost - {description}\n\
         [Unit]\n\
         Description={display_name}\n\
         \n\
         [Service]\n\
         ExecStart={exe}\n\
         Environment=VSF_CONFIG_DIR={config_dir}\n\
         Environment=VSF_SERVICE_NAME={service_name}\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n",
        description = config.description,
        display_name = config.display_name,
        exe = exe.display(),
        config_dir = config.config_dir.display(),
        service_name = config.service_name,
    )
}

pub async fn install(config: Config) -> anyhow::Result<()> {
    let path = unit_path(&config);
    if path.exists() {
        anyhow::bail!(
            "The service '{}' already exists as an installed service ({})",
            config.service_name,
            path.display()
        );
    }

    let exe = std::env::current_exe()?;
    fs::create_dir_all(&config.unit_dir)?;
    fs::write(&path, render_unit(&config, &exe))?;

    println!(
        "{} The service {} was installed successfully ({}).",
        "✓".green(),
        config.service_name.bold(),
        path.display()
    );
    Ok(())
}

pub async fn uninstall(config: Config) -> anyhow::Result<()> {
    let path = unit_path(&config);
    if !path.exists() {
        anyhow::bail!(
            "The service '{}' does not exist as an installed service",
            config.service_name
        );
    }

    fs::remove_file(&path)?;
    println!(
        "{} The service {} was uninstalled successfully.",
        "✓".green(),
        config.service_name.bold()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unit_names_host_and_config_dir() {
        let mut config = Config::with_config_dir("/srv/vsf");
        config.service_name = "edge".to_string();

        let unit = render_unit(&config, Path::new("/usr/bin/vsfhost"));
        assert!(unit.contains("ExecStart=/usr/bin/vsfhost\n"));
        assert!(unit.contains("Environment=VSF_CONFIG_DIR=/srv/vsf\n"));
        assert!(unit.contains("Environment=VSF_SERVICE_NAME=edge\n"));
        assert!(unit.contains("Description=Virtual Services Framework Host\n"));
    }

    #[tokio::test]
    async fn install_twice_and_uninstall_twice_fail() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_config_dir(temp_dir.path().join("conf"));
        config.unit_dir = temp_dir.path().join("units");

        install(config.clone()).await.unwrap();
        assert!(unit_path(&config).exists());
        assert!(install(config.clone()).await.is_err());

        uninstall(config.clone()).await.unwrap();
        assert!(!unit_path(&config).exists());
        assert!(uninstall(config).await.is_err());
    }
}
