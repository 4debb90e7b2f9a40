//! 設定ファイルのコマンド（config show / config init）

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use crate::model::AppConfig;

/// Shows or creates the configuration file
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Prints the effective configuration
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Writes the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, config: &AppConfig, path: &Path) -> Result<()> {
        match self.action {
            ConfigAction::Show { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(config)?);
                } else {
                    config.display();
                }
            }
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!(
                        "設定ファイルは既に存在します: {} (--force で上書き)",
                        path.display()
                    );
                }
                AppConfig::default().save(path)?;
                log::info!("設定ファイルを作成しました: {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("food101.json");
        let init = |force| ConfigCommand {
            action: ConfigAction::Init { force },
        };

        init(false).execute(&AppConfig::default(), &path).unwrap();
        assert!(AppConfig::load(&path).is_ok());

        std::fs::write(&path, "{}").unwrap();
        assert!(init(false).execute(&AppConfig::default(), &path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        init(true).execute(&AppConfig::default(), &path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().subset.num_classes, 3);
    }
}
