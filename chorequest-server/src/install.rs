use std::fs;
use std::path::{Path, PathBuf};

use tinytemplate::TinyTemplate;

const EXAMPLE_CONFIG: &str = include_str!("../config.yaml.example");
const UNIT_TEMPLATE: &str = include_str!("../systemd/chorequest-server.service");

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unit template: {0}")]
    Template(#[from] tinytemplate::error::Error),
}

fn io_err(path: &Path, source: std::io::Error) -> InstallError {
    InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn render_default_config() -> String {
    // Stamp a fresh random secret over the example's placeholder.
    EXAMPLE_CONFIG.replace(
        "change-this-to-a-long-random-secret",
        &uuid::Uuid::new_v4().to_string(),
    )
}

#[derive(serde::Serialize)]
struct UnitCtx<'a> {
    binary_path: &'a str,
    config_path: &'a str,
    db_path: &'a str,
    user: &'a str,
    group: &'a str,
    working_dir: &'a str,
}

fn render_unit(ctx: &UnitCtx) -> Result<String, InstallError> {
    let mut tt = TinyTemplate::new();
    tt.add_template("unit", UNIT_TEMPLATE)?;
    Ok(tt.render("unit", ctx)?)
}

/// Write `contents` at `path` unless something is already there and `force`
/// is off. Returns whether the file was written.
fn place_file(path: &Path, contents: &str, force: bool, what: &str) -> Result<bool, InstallError> {
    if path.exists() && !force {
        eprintln!(
            "{what} exists at {}; skipping (use --force to overwrite)",
            path.display()
        );
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    fs::write(path, contents).map_err(|e| io_err(path, e))?;
    println!("Wrote {what} to {}", path.display());
    Ok(true)
}

fn remove_if_present(path: &Path, what: &str) -> Result<(), InstallError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| io_err(path, e))?;
        println!("Removed {what} {}", path.display());
    } else {
        println!("No {what} at {}; skipping", path.display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn install_system(
    unit_path: &Path,
    config_path: &Path,
    db_path: &Path,
    binary_path: &Path,
    user: &str,
    group: &str,
    working_dir: &Path,
    force: bool,
) -> Result<(), InstallError> {
    if let Some(dir) = db_path.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    if place_file(config_path, &render_default_config(), force, "config")? {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // The config holds the JWT secret and password hashes.
            let _ = fs::set_permissions(config_path, fs::Permissions::from_mode(0o640));
        }
    }

    let ctx = UnitCtx {
        binary_path: &binary_path.display().to_string(),
        config_path: &config_path.display().to_string(),
        db_path: &db_path.display().to_string(),
        user,
        group,
        working_dir: &working_dir.display().to_string(),
    };
    place_file(unit_path, &render_unit(&ctx)?, force, "unit")?;

    println!(
        "Done. Run: sudo systemctl daemon-reload && sudo systemctl enable --now chorequest-server"
    );
    Ok(())
}

pub fn uninstall_system(
    unit_path: &Path,
    remove_config: bool,
    config_path: &Path,
) -> Result<(), InstallError> {
    remove_if_present(unit_path, "unit")?;
    if remove_config {
        remove_if_present(config_path, "config")?;
    }
    println!("Run: sudo systemctl daemon-reload && sudo systemctl disable --now chorequest-server");
    Ok(())
}
