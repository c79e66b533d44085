use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use healthcrm::client::{ApiClient, ApiRequest, LogEvents};
use healthcrm::config::{self, LogFormat};
use healthcrm::models::reminder::{Relation, Reminder};
use healthcrm::reminders::{self, HttpRemindersApi, ReminderReconciler, RemindersApi};
use healthcrm::store::FileSessionStore;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.log_format);

    let args = cli::Cli::parse();

    let store = Arc::new(FileSessionStore::new(&cfg.session_file));
    let client = Arc::new(ApiClient::new(cfg.client.clone(), store, Arc::new(LogEvents))?);

    let result = match args.command {
        cli::Commands::Login { email, password } => {
            let session = client.login(&email, &password).await?;
            println!("Signed in.");
            if let Some(tenant) = session.tenant_id {
                println!("  Tenant: {}", tenant);
            }
            Ok(())
        }
        cli::Commands::Logout => {
            client.logout().await?;
            println!("Signed out.");
            Ok(())
        }
        cli::Commands::Whoami => handle_whoami(&client).await,
        cli::Commands::Tenant { command } => handle_tenant_command(&client, command).await,
        cli::Commands::Request { method, path, body } => {
            handle_request(&client, &method, &path, body.as_deref()).await
        }
        cli::Commands::Reminders { command } => handle_reminder_command(client, command).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "healthcrm=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn handle_whoami(client: &ApiClient) -> anyhow::Result<()> {
    let session = client.store().load().await?;
    if !session.is_authenticated() {
        println!("Not signed in.");
        return Ok(());
    }
    println!("Signed in.");
    println!("  Tenant:    {}", session.tenant_id.as_deref().unwrap_or("-"));
    if let Some(at) = session.refreshed_at {
        println!("  Refreshed: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(perms) = &session.permissions {
        println!("  Modules:   {}", perms.modules.join(", "));
        println!("  Grants:    {}", perms.permissions.len());
    }
    Ok(())
}

async fn handle_tenant_command(client: &ApiClient, cmd: cli::TenantCommands) -> anyhow::Result<()> {
    match cmd {
        cli::TenantCommands::Set { tenant_id } => {
            client.set_tenant(Some(tenant_id.clone())).await?;
            println!("Tenant set to {}.", tenant_id);
        }
        cli::TenantCommands::Clear => {
            client.set_tenant(None).await?;
            println!("Tenant cleared.");
        }
    }
    Ok(())
}

async fn handle_request(
    client: &ApiClient,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> anyhow::Result<()> {
    let method: reqwest::Method = method
        .to_uppercase()
        .parse()
        .with_context(|| format!("invalid HTTP method: {}", method))?;

    let mut req = ApiRequest::new(method, path).user_initiated();
    if let Some(raw) = body {
        let value: serde_json::Value = serde_json::from_str(raw).context("--body is not valid JSON")?;
        req = req.json(value);
    }

    let payload: serde_json::Value = client.request(req).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn handle_reminder_command(
    client: Arc<ApiClient>,
    cmd: cli::ReminderCommands,
) -> anyhow::Result<()> {
    let api = HttpRemindersApi::new(client);

    match cmd {
        cli::ReminderCommands::List {
            relation_id,
            relation_type,
        } => {
            let relation = Relation::new(relation_id, relation_type);
            let items = api.list(&relation).await?;
            print_reminders(&items);
        }
        cli::ReminderCommands::Sync {
            relation_id,
            relation_type,
            file,
            dry_run,
        } => {
            let relation = Relation::new(relation_id, relation_type);
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let desired: Vec<Reminder> = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a JSON array of reminders", file.display()))?;

            if dry_run {
                let current = api.list(&relation).await?;
                let plan = reminders::plan(&relation, &current, &desired);
                println!("Planned operations: {}", plan.len());
                for id in &plan.deletes {
                    println!("  delete {}", id);
                }
                for (id, item) in &plan.updates {
                    println!("  update {} ({})", id, item.title);
                }
                for item in &plan.creates {
                    println!("  create ({})", item.title);
                }
                return Ok(());
            }

            let outcome = ReminderReconciler::new(api).sync(&relation, &desired).await?;
            println!(
                "Synced: {} deleted, {} updated, {} created.",
                outcome.deleted, outcome.updated, outcome.created
            );
            print_reminders(&outcome.reminders);
        }
        cli::ReminderCommands::Complete { id, undo } => {
            let updated = api.set_completed(&id, !undo).await?;
            println!(
                "Reminder {} marked {}.",
                updated.id.as_deref().unwrap_or(&id),
                if updated.is_completed { "done" } else { "open" }
            );
        }
    }
    Ok(())
}

fn print_reminders(items: &[Reminder]) {
    if items.is_empty() {
        println!("No reminders found.");
        return;
    }
    println!("{:<24} {:<12} {:<6} {:<5} TITLE", "ID", "DATE", "TIME", "DONE");
    for r in items {
        println!(
            "{:<24} {:<12} {:<6} {:<5} {}",
            r.id.as_deref().unwrap_or("-"),
            r.date,
            r.time,
            if r.is_completed { "yes" } else { "no" },
            r.title
        );
    }
}
