//! Campusload CLI - bulk import/export for the university portal
//!
//! # Main Commands
//!
//! ```bash
//! campusload serve                                  # Start HTTP server (port 3000)
//! campusload init-db                                # Create the database schema
//! campusload import establishments etabs.xlsx       # Import a spreadsheet
//! campusload export programs --format csv -o f.csv  # Export to a file
//! campusload template programs                      # Print the CSV import template
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! campusload headers upload.xlsx                    # Show how headers are recognized
//! ```

use clap::{Parser, Subcommand};
use campusload::{
    decode, export, import_file, map_headers, template, EntityKind, ExportFilters,
    ExportFormat, ExportSpec, ServerConfig, SpreadsheetKind, Store,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "campusload")]
#[command(about = "Bulk import/export of establishments and programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Database URL
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Create the database and apply the schema
    InitDb {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Import a spreadsheet (.xlsx or .csv) and print the summary as JSON
    Import {
        /// establishments | programs
        kind: EntityKind,

        /// Input file
        input: PathBuf,

        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Export rows to xlsx, csv or json
    Export {
        /// establishments | programs
        kind: EntityKind,

        /// Output format (default depends on the entity)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Comma-separated field keys (default: all)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Substring of the name or code
        #[arg(short, long)]
        search: Option<String>,

        /// Parent id (university or establishment)
        #[arg(long)]
        scope_id: Option<i64>,

        /// Output file (default: the generated download name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Write the CSV import template
    Template {
        /// establishments | programs
        kind: EntityKind,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a file and show how its headers map for each entity
    Headers {
        /// Input file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port, database_url } => cmd_serve(port, database_url).await,

        Commands::InitDb { database_url } => cmd_init_db(database_url).await,

        Commands::Import { kind, input, database_url } => {
            cmd_import(kind, &input, database_url).await
        }

        Commands::Export { kind, format, fields, search, scope_id, output, database_url } => {
            let filters = ExportFilters { search, institution_id: scope_id };
            cmd_export(kind, format, fields, filters, output.as_deref(), database_url).await
        }

        Commands::Template { kind, output } => cmd_template(kind, output.as_deref()),

        Commands::Headers { input } => cmd_headers(&input),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(
    port: Option<u16>,
    database_url: Option<String>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(url) = database_url {
        config = config.with_database_url(url);
    }
    Ok(config)
}

async fn open_store(database_url: Option<String>) -> Result<Store, Box<dyn std::error::Error>> {
    let config = load_config(None, database_url)?;
    Ok(Store::connect(&config.database_url).await?)
}

async fn cmd_serve(
    port: Option<u16>,
    database_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(port, database_url)?;
    campusload::server::start_server(config).await
}

async fn cmd_init_db(database_url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(None, database_url)?;
    Store::connect(&config.database_url).await?;
    eprintln!("✅ Schema applied to {}", config.database_url);
    Ok(())
}

async fn cmd_import(
    kind: EntityKind,
    input: &Path,
    database_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing {}: {}", kind, input.display());

    let store = open_store(database_url).await?;
    let summary = import_file(&store, kind, input).await?;

    eprintln!(
        "\n📊 Results: {} imported, {} updated, {} skipped, {} errors",
        summary.imported,
        summary.updated,
        summary.skipped,
        summary.errors.len()
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_export(
    kind: EntityKind,
    format: Option<ExportFormat>,
    fields: Vec<String>,
    filters: ExportFilters,
    output: Option<&Path>,
    database_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let profile = kind.profile();
    let format = format.unwrap_or(profile.default_export_format);
    let fields = if fields.is_empty() { campusload::export::default_fields(profile) } else { fields };

    let store = open_store(database_url).await?;
    let artifact = export(&store, kind, &ExportSpec { fields, filters }, format).await?;

    let path = output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&artifact.filename));
    fs::write(&path, &artifact.bytes)?;
    eprintln!("💾 Export written to: {}", path.display());
    Ok(())
}

fn cmd_template(kind: EntityKind, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = template(kind)?;
    match output {
        Some(p) => {
            fs::write(p, &artifact.bytes)?;
            eprintln!("💾 Template written to: {}", p.display());
        }
        None => print!("{}", String::from_utf8_lossy(&artifact.bytes)),
    }
    Ok(())
}

fn cmd_headers(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file_name = input.file_name().and_then(|n| n.to_str());
    let format = SpreadsheetKind::detect(None, file_name)
        .ok_or_else(|| format!("Unsupported file type: {}", input.display()))?;
    let grid = decode(&fs::read(input)?, format)?;
    let headers = grid.headers();

    eprintln!("📋 {} columns, {} data rows:", headers.len(), grid.data_rows().len());
    for (i, header) in headers.iter().enumerate() {
        eprintln!("   [{:2}] {}", i + 1, header);
    }

    for kind in [EntityKind::Establishment, EntityKind::Program] {
        eprintln!("\n🔎 As {}:", kind);
        match map_headers(&headers, kind.profile()) {
            Ok(map) => {
                for (field, column) in map.iter() {
                    eprintln!("   {:<10} ← [{:2}] {}", field.as_str(), column, headers[column - 1]);
                }
            }
            Err(e) => eprintln!("   ❌ {}", e),
        }
    }
    Ok(())
}
