//! Interactive menu
//!
//! Prompts for environment, strategy and confirmation, then drives the
//! selection, backup, delete and restore operations of [`App`].

use anyhow::{Context, Result};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use dsprune::app::{App, Settings};
use dsprune::bulk::{BatchReport, DeleteOutcome};
use dsprune::config::{Config, Credentials, Environment};
use dsprune::selection::{parse_ids, Country, CountryScope, Criterion, Selection};
use std::future::Future;
use std::time::Instant;

/// Free-text prompts give up after this many invalid answers
pub const MAX_PROMPT_ATTEMPTS: usize = 3;

const SEPARATOR: &str = "========================================";

/// What to do after the selection has been shown
enum Decision {
    Delete,
    Cancel,
    SwitchToIds,
}

pub async fn run(config: &mut Config, settings: &Settings) -> Result<()> {
    let theme = ColorfulTheme::default();
    let items = ["Delete data sources", "Restore a previous deletion", "Exit"];

    loop {
        println!("{}", SEPARATOR);
        let choice = Select::with_theme(&theme)
            .with_prompt("Redash data source cleanup")
            .items(&items)
            .default(0)
            .interact()?;

        let outcome = match choice {
            0 => timed(delete_menu(&theme, config, settings)).await,
            1 => timed(restore_menu(&theme, config, settings)).await,
            _ => break,
        };

        if let Err(e) = outcome {
            tracing::error!("Menu action failed: {:#}", e);
            println!("{} {:#}", style("Error:").red().bold(), e);
        }
    }

    Ok(())
}

async fn timed<F: Future<Output = Result<()>>>(action: F) -> Result<()> {
    let start = Instant::now();
    let result = action.await;
    println!("Execution time: {:.2?}", start.elapsed());
    result
}

/// Ask for an environment and open a session against it.
/// Missing credentials are reported and yield `None`.
fn open_session(theme: &ColorfulTheme, config: &mut Config, settings: &Settings) -> Result<Option<App>> {
    let labels: Vec<&str> = Environment::ALL.iter().map(|e| e.label()).collect();
    let default = config
        .last_environment
        .and_then(|last| Environment::ALL.iter().position(|e| *e == last))
        .unwrap_or(0);

    let choice = Select::with_theme(theme)
        .with_prompt("Which environment?")
        .items(&labels)
        .default(default)
        .interact()?;
    let environment = Environment::ALL[choice];

    let credentials = match Credentials::from_env(environment) {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("{} {}", style("Cannot use this environment:").yellow(), e);
            return Ok(None);
        }
    };

    if let Err(e) = config.set_environment(environment) {
        tracing::warn!("Failed to save config: {}", e);
    }

    Ok(Some(App::new(&credentials, settings)?))
}

/// Prompt until `parse` accepts the answer, at most `MAX_PROMPT_ATTEMPTS` times
fn prompt_with_retry<T, F>(theme: &ColorfulTheme, prompt: &str, parse: F) -> Result<Option<T>>
where
    F: Fn(&str) -> dsprune::Result<T>,
{
    for attempt in 1..=MAX_PROMPT_ATTEMPTS {
        let answer: String = Input::with_theme(theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;

        match parse(&answer) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                println!("{} {}", style("Invalid option, please try again:").yellow(), e);
                tracing::debug!("Prompt {:?} attempt {} rejected: {}", prompt, attempt, e);
            }
        }
    }

    println!("Too many invalid answers, back to the main menu.");
    Ok(None)
}

async fn delete_menu(theme: &ColorfulTheme, config: &mut Config, settings: &Settings) -> Result<()> {
    let Some(app) = open_session(theme, config, settings)? else {
        return Ok(());
    };

    let strategies = [
        "By database name (without country prefix)",
        "By failed connection test",
        "By ID",
        "Back",
    ];
    let strategy = Select::with_theme(theme)
        .with_prompt("Delete data sources")
        .items(&strategies)
        .default(0)
        .interact()?;

    let result = match strategy {
        0 => delete_by_name(theme, &app).await,
        1 => delete_by_failed_test(theme, &app).await,
        2 => delete_by_ids(theme, &app).await,
        _ => Ok(()),
    };

    app.close();
    result
}

fn prompt_scope(theme: &ColorfulTheme) -> Result<CountryScope> {
    let scopes = [
        ("All three countries (br-, co-, mx-)", CountryScope::All),
        ("Brazil only (br-)", CountryScope::Country(Country::Br)),
        ("Colombia only (co-)", CountryScope::Country(Country::Co)),
        ("Mexico only (mx-)", CountryScope::Country(Country::Mx)),
        ("Exact database name", CountryScope::Exact),
    ];
    let labels: Vec<&str> = scopes.iter().map(|(label, _)| *label).collect();

    let choice = Select::with_theme(theme)
        .with_prompt("Which countries?")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(scopes[choice].1)
}

async fn delete_by_name(theme: &ColorfulTheme, app: &App) -> Result<()> {
    let scope = prompt_scope(theme)?;
    let Some(criterion) =
        prompt_with_retry(theme, "Database name", |answer| Criterion::by_database_name(answer, scope))?
    else {
        return Ok(());
    };

    println!("Data sources for {} in {}", criterion, app.environment);
    let selection = app.select(&criterion).await?;
    print_selection(&selection);

    if selection.is_empty() {
        println!("No data sources match {}", criterion);
        return Ok(());
    }

    match decide(theme, &format!("Delete data sources of {}?", criterion))? {
        Decision::Delete => delete_selection(app, &selection).await,
        Decision::SwitchToIds => delete_by_ids(theme, app).await,
        Decision::Cancel => Ok(()),
    }
}

async fn delete_by_failed_test(theme: &ColorfulTheme, app: &App) -> Result<()> {
    let selection = app.select(&Criterion::ByFailedHealthCheck).await?;
    print_selection(&selection);

    if selection.is_empty() {
        println!("No data sources with a failed test in {}", app.environment);
        return Ok(());
    }

    let prompt = format!("Delete data sources with a failed test in {}?", app.environment);
    match decide(theme, &prompt)? {
        Decision::Delete => delete_selection(app, &selection).await,
        Decision::SwitchToIds => delete_by_ids(theme, app).await,
        Decision::Cancel => Ok(()),
    }
}

async fn delete_by_ids(theme: &ColorfulTheme, app: &App) -> Result<()> {
    let prompt = format!("Data source IDs to delete in {}", app.environment);
    let Some(ids) = prompt_with_retry(theme, &prompt, parse_ids)? else {
        return Ok(());
    };

    let selection = app.select(&Criterion::by_ids(ids)?).await?;
    print_selection(&selection);

    if selection.is_empty() {
        println!("None of the given IDs could be fetched");
        return Ok(());
    }

    let confirmed = Confirm::with_theme(theme)
        .with_prompt(format!("Delete these data sources in {}?", app.environment))
        .default(false)
        .interact()?;

    if confirmed {
        delete_selection(app, &selection).await?;
    }
    Ok(())
}

fn decide(theme: &ColorfulTheme, prompt: &str) -> Result<Decision> {
    let options = ["Yes", "No", "Delete by ID instead"];
    let choice = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(&options)
        .default(1)
        .interact()?;

    Ok(match choice {
        0 => Decision::Delete,
        2 => Decision::SwitchToIds,
        _ => Decision::Cancel,
    })
}

async fn delete_selection(app: &App, selection: &Selection) -> Result<()> {
    let outcome = app
        .delete(&selection.matched)
        .await
        .context("Delete aborted, nothing was removed without a backup")?;
    print_delete_outcome(&outcome);
    Ok(())
}

async fn restore_menu(theme: &ColorfulTheme, config: &mut Config, settings: &Settings) -> Result<()> {
    let Some(app) = open_session(theme, config, settings)? else {
        return Ok(());
    };

    let result = restore_from_prompt(theme, &app).await;
    app.close();
    result
}

async fn restore_from_prompt(theme: &ColorfulTheme, app: &App) -> Result<()> {
    let snapshots = app.store().list()?;

    let name = if snapshots.is_empty() {
        let prompt = format!("Backup file name in {}", app.backup_dir().display());
        Input::<String>::with_theme(theme).with_prompt(prompt).interact_text()?
    } else {
        let mut labels: Vec<String> = snapshots
            .iter()
            .map(|s| format!("{} ({} bytes)", s.file_name, s.size))
            .collect();
        labels.push("Other file...".to_string());

        let choice = Select::with_theme(theme)
            .with_prompt("Backup to restore")
            .items(&labels)
            .default(0)
            .interact()?;

        match snapshots.get(choice) {
            Some(snapshot) => snapshot.path.to_string_lossy().into_owned(),
            None => Input::<String>::with_theme(theme)
                .with_prompt("Backup file path")
                .interact_text()?,
        }
    };

    let (path, data_sources) = app
        .load_snapshot(&name)
        .with_context(|| format!("Cannot read backup {}", name))?;

    for data_source in &data_sources {
        println!("{}", data_source);
    }

    let confirmed = Confirm::with_theme(theme)
        .with_prompt(format!(
            "Restore {} data source(s) from {} into {}?",
            data_sources.len(),
            path.display(),
            app.environment
        ))
        .default(false)
        .interact()?;

    if confirmed {
        let report = app.restore(&data_sources).await?;
        print_report("created", &report);
    }
    Ok(())
}

pub fn print_selection(selection: &Selection) {
    println!("{}", SEPARATOR);
    println!("Data sources:");
    println!("{}", SEPARATOR);
    for data_source in &selection.matched {
        println!("{}", data_source);
    }
    for failure in &selection.failures {
        println!("{} {}", style("skipped").yellow(), failure);
    }
    println!("{}", SEPARATOR);
}

pub fn print_delete_outcome(outcome: &DeleteOutcome) {
    if let Some(backup) = &outcome.backup {
        println!("Backup written to {}", style(backup.display()).cyan());
    }
    print_report("deleted", &outcome.report);
}

pub fn print_report(verb: &str, report: &BatchReport) {
    println!(
        "{} {} of {} data source(s)",
        style(verb).green().bold(),
        report.succeeded,
        report.total()
    );
    for failure in &report.failed {
        println!("{} {}", style("failed").red(), failure);
    }
}
