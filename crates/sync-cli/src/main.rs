//! metasync CLI
//!
//! Command-line interface for inspecting and syncing metadata between the
//! dev and prod databases. Connection settings come from the same
//! `DEV_DB_*` / `PROD_DB_*` variables as the API server.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use metasync_core::{
    Catalog, Category, Context, Entity, EntityKind, Environment, Role, System, TableAudit,
};
use metasync_storage::{DbSettings, PgStore, PresenceRow, SyncService};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "metasync")]
#[command(version, about = "metasync dev/prod metadata CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the metadata and audit tables
    Init {
        /// Only initialize one environment (dev or prod)
        #[arg(short, long, value_parser = parse_environment)]
        env: Option<Environment>,
    },

    /// Show which records exist in dev and prod
    List {
        /// systems, roles, categories, catalogs or contexts
        #[arg(value_parser = parse_kind)]
        entity: EntityKind,
    },

    /// Print the dev and prod copies of one record
    Show {
        #[arg(value_parser = parse_kind)]
        entity: EntityKind,
        id: i32,
    },

    /// Copy one record from dev to prod
    Sync {
        #[arg(value_parser = parse_kind)]
        entity: EntityKind,
        id: i32,

        /// Recorded as `changed_by` in the prod audit trail
        #[arg(long)]
        changed_by: Option<String>,
    },

    /// Show the audit history of one record
    Audit {
        #[arg(value_parser = parse_kind)]
        entity: EntityKind,
        id: i32,

        #[arg(short, long, default_value = "dev", value_parser = parse_environment)]
        env: Environment,
    },
}

fn parse_kind(raw: &str) -> Result<EntityKind, String> {
    raw.parse::<EntityKind>().map_err(|e| e.to_string())
}

fn parse_environment(raw: &str) -> Result<Environment, String> {
    raw.parse::<Environment>().map_err(|e| e.to_string())
}

/// Run `$func::<T>(args..)` for the entity type behind `$kind`.
macro_rules! for_kind {
    ($kind:expr, $func:ident($($arg:expr),*)) => {
        match $kind {
            EntityKind::System => $func::<System>($($arg),*).await,
            EntityKind::Role => $func::<Role>($($arg),*).await,
            EntityKind::Category => $func::<Category>($($arg),*).await,
            EntityKind::Catalog => $func::<Catalog>($($arg),*).await,
            EntityKind::Context => $func::<Context>($($arg),*).await,
        }
    };
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { env } => init(env).await,
        Commands::List { entity } => match service().await {
            Ok(sync) => for_kind!(entity, list_status(&sync)),
            Err(e) => Err(e),
        },
        Commands::Show { entity, id } => match service().await {
            Ok(sync) => for_kind!(entity, show_record(&sync, id)),
            Err(e) => Err(e),
        },
        Commands::Sync {
            entity,
            id,
            changed_by,
        } => match service().await {
            Ok(sync) => for_kind!(entity, sync_record(&sync, id, changed_by.as_deref())),
            Err(e) => Err(e),
        },
        Commands::Audit { entity, id, env } => match service().await {
            Ok(sync) => show_audit(&sync, entity, id, env).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn connect(environment: Environment) -> CliResult<PgStore> {
    let settings = DbSettings::from_env(environment)?;
    tracing::debug!(environment = %environment, url = %settings.redacted_url(), "Connecting");
    Ok(PgStore::connect(&settings, environment).await?)
}

async fn service() -> CliResult<SyncService<PgStore>> {
    let dev = connect(Environment::Dev).await?;
    let prod = connect(Environment::Prod).await?;
    Ok(SyncService::new(dev, prod))
}

async fn init(only: Option<Environment>) -> CliResult<()> {
    let targets = match only {
        Some(environment) => vec![environment],
        None => vec![Environment::Dev, Environment::Prod],
    };

    for environment in targets {
        let store = connect(environment).await?;
        store.initialize().await?;
        println!("Initialized schema in {}", environment);
    }
    Ok(())
}

async fn list_status<T: Entity>(sync: &SyncService<PgStore>) -> CliResult<()> {
    let rows = sync.status::<T>().await?;
    println!("{} ({})", T::KIND.label(), T::KIND.table_name());
    println!();
    print!("{}", render_status(&rows));
    Ok(())
}

async fn show_record<T: Entity>(sync: &SyncService<PgStore>, id: i32) -> CliResult<()> {
    let record = sync.get::<T>(id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn sync_record<T: Entity>(
    sync: &SyncService<PgStore>,
    id: i32,
    changed_by: Option<&str>,
) -> CliResult<()> {
    let synced = sync.sync::<T>(id, changed_by).await?;
    println!(
        "Synced {} {} to prod ({:?})",
        T::KIND.label().to_lowercase(),
        id,
        synced.outcome
    );
    Ok(())
}

async fn show_audit(
    sync: &SyncService<PgStore>,
    kind: EntityKind,
    id: i32,
    environment: Environment,
) -> CliResult<()> {
    let rows = sync.history(environment, kind, id).await?;
    if rows.is_empty() {
        println!("No audit history for {} {} in {}", kind.label(), id, environment);
        return Ok(());
    }
    print!("{}", render_audit(&rows));
    Ok(())
}

fn format_timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn render_status(rows: &[PresenceRow]) -> String {
    let mut out = format!(
        "{:>6}  {:<4}  {:<4}  {:<19}  {:<19}  {}\n",
        "ID", "DEV", "PROD", "DEV UPDATED", "PROD UPDATED", "IN SYNC"
    );
    for row in rows {
        out.push_str(&format!(
            "{:>6}  {:<4}  {:<4}  {:<19}  {:<19}  {}\n",
            row.id,
            yes_no(row.dev_present),
            yes_no(row.prod_present),
            format_timestamp(row.dev_updated),
            format_timestamp(row.prod_updated),
            yes_no(row.in_sync()),
        ));
    }
    out.push_str(&format!("\n{} record(s)\n", rows.len()));
    out
}

fn render_audit(rows: &[TableAudit]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "{}  {:<6}  {}",
            format_timestamp(Some(row.changed_at)),
            row.action,
            row.changed_by.as_deref().unwrap_or("-"),
        ));
        if let Some(reason) = &row.change_reason {
            out.push_str(&format!("  ({})", reason));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["metasync", "sync", "categories", "7"]).unwrap();
        match cli.command {
            Commands::Sync { entity, id, changed_by } => {
                assert_eq!(entity, EntityKind::Category);
                assert_eq!(id, 7);
                assert!(changed_by.is_none());
            }
            _ => panic!("expected sync"),
        }

        let cli = Cli::try_parse_from(["metasync", "audit", "Role", "3", "--env", "prod"]).unwrap();
        match cli.command {
            Commands::Audit { entity, env, .. } => {
                assert_eq!(entity, EntityKind::Role);
                assert_eq!(env, Environment::Prod);
            }
            _ => panic!("expected audit"),
        }

        assert!(Cli::try_parse_from(["metasync", "list", "widgets"]).is_err());
        assert!(Cli::try_parse_from(["metasync", "init", "--env", "qa"]).is_err());
    }

    #[test]
    fn test_render_status() {
        let rows = vec![
            PresenceRow {
                id: 1,
                dev_present: true,
                prod_present: true,
                dev_updated: Some(ts(9)),
                prod_updated: Some(ts(9)),
            },
            PresenceRow {
                id: 2,
                dev_present: true,
                prod_present: false,
                dev_updated: Some(ts(10)),
                prod_updated: None,
            },
        ];
        let out = render_status(&rows);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("PROD UPDATED"));
        assert!(lines[1].contains("2024-03-01 09:00:00"));
        assert!(lines[1].trim_end().ends_with("yes"));
        assert!(lines[2].contains(" - "));
        assert!(lines[2].trim_end().ends_with("no"));
        assert!(out.ends_with("2 record(s)\n"));
    }

    #[test]
    fn test_render_audit() {
        let rows = vec![TableAudit {
            audit_id: 1,
            table_name: "systems".to_string(),
            record_id: 4,
            action: "SYNC".to_string(),
            old_data: None,
            new_data: None,
            changed_by: Some("bob".to_string()),
            changed_at: ts(12),
            change_reason: Some("synced from dev".to_string()),
        }];
        assert_eq!(
            render_audit(&rows),
            "2024-03-01 12:00:00  SYNC    bob  (synced from dev)\n"
        );
    }
}
