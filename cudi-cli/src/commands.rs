use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cudi_identity::crypto::vault;
use cudi_identity::{IdentityInfo, IdentityManager};
use tracing::{info, warn};

use crate::cli::Command;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// File name used when `export` is not given `--out`.
pub fn default_backup_name() -> String {
    format!("cudi_identity_{}.json", chrono::Utc::now().format("%Y-%m-%d"))
}

/// Load the stored identity, then run `command` against it.
pub async fn run(command: Command, manager: &mut IdentityManager, out: &mut dyn Write) -> CliResult<()> {
    let existing = manager.init().await?;

    match command {
        Command::Show { json } => show(existing.as_ref(), json, out),
        Command::Create { force } => {
            refuse_to_replace(existing.as_ref(), force)?;
            let created = manager.create().await?;
            writeln!(out, "Created new identity.")?;
            print_identity(&created, out)?;
            writeln!(out, "Remember to export a backup: cudi export")?;
            Ok(())
        }
        Command::Export {
            out: path,
            password,
            confirm,
        } => {
            if confirm != password {
                return Err("passwords do not match".into());
            }
            let envelope = manager.export_backup(&password).await?;
            let path = path.unwrap_or_else(|| PathBuf::from(default_backup_name()));
            write_new_file(&path, &vault::to_backup_json(&envelope)?)?;
            info!(path = %path.display(), "Backup written");
            writeln!(out, "Backup written to {}", path.display())?;
            writeln!(out, "Keep the file and its password somewhere safe.")?;
            Ok(())
        }
        Command::Restore {
            file,
            password,
            force,
        } => {
            refuse_to_replace(existing.as_ref(), force)?;
            let contents = fs::read_to_string(&file)
                .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
            let restored = manager.restore_backup(&contents, &password).await?;
            writeln!(out, "Identity restored.")?;
            print_identity(&restored, out)?;
            Ok(())
        }
        Command::Reset { yes } => {
            if !yes {
                return Err("refusing to delete the identity without --yes".into());
            }
            manager.reset()?;
            writeln!(out, "Identity deleted.")?;
            Ok(())
        }
    }
}

fn show(identity: Option<&IdentityInfo>, json: bool, out: &mut dyn Write) -> CliResult<()> {
    match identity {
        Some(info) if json => writeln!(out, "{}", serde_json::to_string_pretty(info)?)?,
        Some(info) => print_identity(info, out)?,
        None => writeln!(
            out,
            "No identity. Run `cudi create` or `cudi restore <FILE>`."
        )?,
    }
    Ok(())
}

fn print_identity(info: &IdentityInfo, out: &mut dyn Write) -> CliResult<()> {
    writeln!(out, "Peer id:    {}", info.peer_id)?;
    writeln!(out, "Public key: {}", info.public_key)?;
    Ok(())
}

fn refuse_to_replace(existing: Option<&IdentityInfo>, force: bool) -> CliResult<()> {
    match existing {
        Some(info) if !force => Err(format!(
            "an identity already exists (peer id {}); pass --force to replace it",
            info.peer_id
        )
        .into()),
        _ => Ok(()),
    }
}

fn write_new_file(path: &Path, contents: &str) -> CliResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
    let written = file
        .write_all(contents.as_bytes())
        .and_then(|()| file.sync_all());
    drop(file);
    remove_on_error(path, written)
}

/// A half-written backup would block later exports to the same path.
fn remove_on_error(path: &Path, written: io::Result<()>) -> CliResult<()> {
    match written {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(remove) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %remove, "Failed to remove partial backup");
            }
            Err(format!("Failed to write {}: {}", path.display(), e).into())
        }
    }
}
