//! Credentials command - manage stored kubeconfig credentials
//!
//! Kubeconfig contents are never printed.

use std::path::{Path, PathBuf};

use berth_kube::{CredentialFile, FileCredentialStore, KubeconfigCredential, KubeconfigSource, Principal};
use clap::Subcommand;
use console::style;

use crate::error::{CliError, Result};

#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    /// List stored credentials
    List {
        /// Only show credentials usable by this owner
        #[arg(long)]
        owner: Option<String>,
    },

    /// Add or replace a credential
    Add {
        /// Credential id
        id: String,

        /// Kubeconfig file
        #[arg(long)]
        kubeconfig: PathBuf,

        /// Copy the kubeconfig into the store instead of referencing its path
        #[arg(long)]
        embed: bool,

        /// Owner allowed to use the credential (repeatable; none means everyone)
        #[arg(long = "owner")]
        owners: Vec<String>,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a credential
    Remove {
        /// Credential id
        id: String,
    },
}

/// Store file from `--credentials-file`, or the default under the user config directory
pub fn store_file(path: Option<&Path>) -> CredentialFile {
    CredentialFile::new(path.map(Path::to_path_buf))
}

/// Run a credentials subcommand
pub fn run(command: &CredentialsCommand, credentials_file: Option<&Path>) -> Result<()> {
    let file = store_file(credentials_file);
    let path = file.path()?;
    let mut store = file.load()?;

    match command {
        CredentialsCommand::List { owner } => {
            list(&store, owner.as_deref());
            Ok(())
        }

        CredentialsCommand::Add {
            id,
            kubeconfig,
            embed,
            owners,
            description,
        } => {
            let mut credential = if *embed {
                let content = std::fs::read_to_string(kubeconfig)?;
                KubeconfigCredential::inline(id, content)
            } else {
                if !kubeconfig.exists() {
                    return Err(CliError::input(format!(
                        "kubeconfig file {} does not exist",
                        kubeconfig.display()
                    )));
                }
                KubeconfigCredential::from_path(id, std::path::absolute(kubeconfig)?)
            };
            for owner in owners {
                credential = credential.with_owner(owner);
            }
            if let Some(description) = description {
                credential = credential.with_description(description);
            }

            store.set(credential);
            store.save_to(&path)?;
            println!(
                "{} Stored credential {} in {}",
                style("✓").green().bold(),
                style(id).cyan(),
                path.display()
            );
            Ok(())
        }

        CredentialsCommand::Remove { id } => {
            if store.remove(id).is_none() {
                return Err(CliError::input_with_help(
                    format!("no credential with id '{}'", id),
                    "run `berth credentials list` to see the stored credential ids",
                ));
            }
            store.save_to(&path)?;
            println!(
                "{} Removed credential {}",
                style("✓").green().bold(),
                style(id).cyan()
            );
            Ok(())
        }
    }
}

fn list(store: &FileCredentialStore, owner: Option<&str>) {
    let credentials: Vec<_> = store
        .credentials()
        .iter()
        .filter(|c| owner.is_none_or(|o| c.visible_to(o, &Principal::System)))
        .collect();

    if credentials.is_empty() {
        println!("No credentials stored");
        return;
    }

    println!(
        "{:<24} {:<10} {:<24} {}",
        style("ID").bold(),
        style("SOURCE").bold(),
        style("OWNERS").bold(),
        style("DESCRIPTION").bold()
    );
    for credential in credentials {
        let source = match &credential.kubeconfig {
            KubeconfigSource::Inline { .. } => "inline".to_string(),
            KubeconfigSource::Path { path } => path.display().to_string(),
        };
        let owners = if credential.owners.is_empty() {
            "*".to_string()
        } else {
            credential.owners.join(",")
        };
        println!(
            "{:<24} {:<10} {:<24} {}",
            credential.id,
            source,
            owners,
            credential.description.as_deref().unwrap_or("")
        );
    }
}
