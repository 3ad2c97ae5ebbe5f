use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pgreflect::config::DbConfig;
use pgreflect::introspect::SelectionFilter;
use pgreflect::schema::{SchemaModel, Table};

#[derive(Parser, Debug)]
#[command(name = "pgreflect")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Comma-separated list of schemas to scan (default: all non-system schemas)
    #[arg(long = "schema", value_delimiter = ',')]
    schemas: Vec<String>,

    /// Comma-separated list of tables to include, as `table` or `schema.table` (default: all)
    #[arg(long = "table", value_delimiter = ',')]
    tables: Vec<String>,

    /// Comma-separated list of tables to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    info!("pgreflect v{}", env!("CARGO_PKG_VERSION"));

    let config = DbConfig::load(&cli.env_file).context("Failed to load database configuration")?;
    debug!(connection = ?config.redacted_connection_string(), "Loaded configuration");

    let filter = SelectionFilter::new()
        .with_schemas(cli.schemas)
        .with_tables(cli.tables)
        .with_exclude(cli.exclude);
    debug!(filter = ?filter, "Selection filter configured");

    let model = introspect_postgres(&config, &filter)?;

    if model.tables.is_empty() {
        warn!("No tables found after filtering");
    }

    print!("{}", render_summary(&model));
    Ok(())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

#[cfg(feature = "postgres")]
fn introspect_postgres(config: &DbConfig, filter: &SelectionFilter) -> Result<SchemaModel> {
    use pgreflect::introspect::{Introspector, ModelBuilder};
    use pgreflect::PostgresExecutor;
    use postgres::NoTls;

    info!(connection = ?config.redacted_connection_string(), "Connecting to PostgreSQL");

    let mut client = config
        .postgres_config()
        .connect(NoTls)
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {}",
                config.redacted_connection_string()
            )
        })?;

    info!("Connected to database");

    let mut executor = PostgresExecutor::new(&mut client);
    let model = ModelBuilder::new(&mut executor)
        .introspect(filter)
        .context("Failed to introspect schema")?;

    Ok(model)
}

#[cfg(not(feature = "postgres"))]
fn introspect_postgres(_config: &DbConfig, _filter: &SelectionFilter) -> Result<SchemaModel> {
    anyhow::bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}

fn render_summary(model: &SchemaModel) -> String {
    let mut lines = vec![format!("default schema: {}", model.default_schema)];
    for table in &model.tables {
        lines.extend(render_table(model, table));
    }
    lines.extend(model.sequences.iter().map(|sequence| {
        format!(
            "sequence {}.{} {} increment {}",
            sequence.schema, sequence.name, sequence.store_type, sequence.bounds.increment_by
        )
    }));
    lines.extend(model.enums.iter().map(|enum_type| {
        format!(
            "enum {}.{} ({})",
            enum_type.schema,
            enum_type.name,
            enum_type.labels.join(", ")
        )
    }));
    lines.extend(
        model
            .extensions
            .iter()
            .map(|extension| format!("extension {} {}", extension.name, extension.version)),
    );

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn render_table(model: &SchemaModel, table: &Table) -> Vec<String> {
    let mut lines = vec![format!("table {table} ({:?})", table.kind)];
    for column in &table.columns {
        let mut flags = Vec::new();
        if !column.is_nullable {
            flags.push("not null".to_string());
        }
        if let Some(ordinal) = column.primary_key_ordinal {
            flags.push(format!("pk {ordinal}"));
        }
        if column.generated_on_add {
            flags.push("generated".to_string());
        }
        if let Some(default) = &column.default_value_sql {
            flags.push(format!("default {default}"));
        }
        lines.push(format!("  {} {} {}", column.name, column.store_type, flags.join(", ")));
    }
    for index in &table.indexes {
        let columns: Vec<_> = index.columns(table).iter().map(|c| c.name.as_str()).collect();
        let unique = if index.is_unique { "unique " } else { "" };
        lines.push(format!("  {unique}index {} ({})", index.name, columns.join(", ")));
    }
    for fk in &table.foreign_keys {
        let (columns, principal_columns): (Vec<_>, Vec<_>) = model
            .foreign_key_columns(fk)
            .into_iter()
            .map(|(c, p)| (c.name.as_str(), p.name.as_str()))
            .unzip();
        lines.push(format!(
            "  foreign key {} ({}) -> {} ({}) on delete {:?}",
            fk.name,
            columns.join(", "),
            model.principal(fk),
            principal_columns.join(", "),
            fk.on_delete
        ));
    }
    lines
}
