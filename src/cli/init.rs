//! Init command - write an example project config

use anyhow::Result;
use codevolve::config::EvolveConfig;
use console::style;
use std::path::Path;

/// Run the init command
pub fn run(dir: &Path) -> Result<()> {
    let (path, created) = EvolveConfig::init_project_config(dir)?;
    if created {
        println!("{} Created {}", style("✓").green(), style(path.display()).cyan());
    } else {
        println!(
            "{} Config already exists at {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
    }

    if let Some(user) = EvolveConfig::user_config_path() {
        println!(
            "  {} {}",
            style("User-wide settings can go in").dim(),
            style(user.display()).cyan()
        );
    }
    Ok(())
}
