//! Stylesheet compilation via an external CLI tool
//!
//! Runs after every build. The tool is a black box; when it fails the build
//! still stands, just with stale styles, and the failure is logged with the
//! tool's stderr.

use std::process::Command;

use crate::error::BuildError;
use crate::Site;

pub fn run(site: &Site) -> Result<(), BuildError> {
    let input = site.base_dir.join(&site.config.styles.input);
    if !input.exists() {
        tracing::debug!("no stylesheet at {:?}, skipping style step", input);
        return Ok(());
    }

    let output = site.out_dir.join(&site.config.styles.output);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::io("create styles dir", e))?;
    }

    let Some((program, args)) = site.config.styles.command.split_first() else {
        return Err(BuildError::Styles("styles.command is empty".to_string()));
    };

    let result = Command::new(program)
        .args(args)
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .output()
        .map_err(|e| BuildError::Styles(format!("failed to run {}: {}", program, e)))?;

    if !result.status.success() {
        return Err(BuildError::Styles(format!(
            "{} exited with {}: {}",
            program,
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    tracing::info!("recompiled styles -> {}", output.display());
    Ok(())
}
