//! One-shot update check printed to the terminal.

use anyhow::Context;
use colored::Colorize;

use crate::api::{AppSource, RuntipiClient};
use crate::appstore;
use crate::config::CheckConfig;
use crate::types::{Catalog, RemoteApp};

pub async fn run(config: &CheckConfig) -> anyhow::Result<()> {
    println!("{} Tipimate version {}", "🛈".blue(), env!("CARGO_PKG_VERSION"));

    let client = RuntipiClient::new(&config.runtipi_url, &config.jwt_secret, config.insecure)
        .context("Failed to create Runtipi client")?;
    let apps = client
        .installed_apps()
        .await
        .context("Failed to get installed apps")?;
    let catalogs = client
        .catalogs()
        .await
        .context("Failed to get appstores")?;

    match outcome(&apps, &catalogs) {
        Outcome::UpToDate => println!("{} All apps are up to date", "✔".green()),
        Outcome::Updates(lines) => {
            for line in lines {
                println!("{} {}", "↻".green(), line);
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    UpToDate,
    Updates(Vec<String>),
}

fn outcome(apps: &[RemoteApp], catalogs: &[Catalog]) -> Outcome {
    let lines: Vec<String> = apps
        .iter()
        .filter(|app| app.has_update())
        .map(|app| update_line(app, &appstore::resolve(&app.urn, catalogs)))
        .collect();
    if lines.is_empty() {
        Outcome::UpToDate
    } else {
        Outcome::Updates(lines)
    }
}

fn update_line(app: &RemoteApp, catalog: &Catalog) -> String {
    format!(
        "Update available for {} ({}) to version {} ({})",
        app.name, catalog.name, app.latest_docker_version, app.latest_version
    )
}
