use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tracing::info;

const ENV_EXAMPLE: &str = r#"# dbfsync environment variables
# Copy this file to .env and fill in your values

# Base URL of the ingestion API
DBFSYNC_API_URL=http://localhost:3000/api

# Sent with every request as company_name
DBFSYNC_COMPANY_NAME=

# Optional overrides
# DBFSYNC_BATCH_SIZE=50
# DBFSYNC_MAX_ATTEMPTS=3
# DBFSYNC_TIMEOUT_SECS=30
# DBFSYNC_INTERVAL_SECS=60
"#;

const PROJECT_CONFIG: &str = r#"# dbfsync configuration
# Values may reference environment variables with ${VAR}

[api]
base_url = "${DBFSYNC_API_URL}"
timeout_secs = 30
max_attempts = 3
backoff_base_ms = 1000
context_key = "company_name"
context_value = "${DBFSYNC_COMPANY_NAME}"

[sync]
batch_size = 50
interval_secs = 60
state_path = "dbfsync_state.json"
feeds_dir = "dbfsync/feeds"
"#;

const EXAMPLE_FEED: &str = r#"# Production orders from the ERP's OPRO table
name = "production_orders"
source = "data/OPRO.DBF"

[diff]
# "content_hash" compares full-record digests; "sequence" tracks a high-water mark
strategy = "sequence"
field = "NO_OPRO"

[endpoint]
resource = "production_orders"
list_key = "production_orders"

[mapping]
key = { source = "NO_OPRO", target = "no_opro" }
keep_always = ["notes"]

[mapping.fields]
product_key = "CVE_PROP"
notes = "OBSERVA"
lote_referencia = "LOTE"
stat_opro = "STAT_OPRO"

[mapping.constants]
warehouse_id = "45c4bbc8-2950-434c-b710-2ae0e080bfd1"

[mapping.quantity]
target = "quantity_requested"
candidates = ["REN_OPRO", "CARGA_OPRO", "CANT_LIQ"]
default = 1000

[mapping.year]
target = "ano"
primary = "FEC_OPRO"
secondary = "ANO"

[mapping.priority]
target = "priority"
field = "STAT_OPRO"
default = "medium"
rules = [
    { match = ["terminada", "completada"], priority = "high" },
    { match = ["cancelada", "rechazada"], priority = "low" },
    { match = ["urgente", "alta"], priority = "high" },
    { match = ["baja"], priority = "low" },
]
"#;

pub fn cmd_init() -> Result<()> {
    println!("Initializing dbfsync in current directory...\n");
    init_in(Path::new("."))?;

    println!("\n{}", "dbfsync initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Copy .env.example to .env and fill in your values");
    println!("  2. Edit dbfsync/feeds/production_orders.toml to point at your table");
    println!("  3. Run: dbfsync run --once");
    println!("  4. Run: dbfsync run\n");
    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping", path.display());
    } else {
        fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

pub(crate) fn init_in(root: &Path) -> Result<()> {
    let feeds_dir = root.join("dbfsync/feeds");
    fs::create_dir_all(&feeds_dir)?;
    info!(path = %feeds_dir.display(), "Created feeds directory");

    write_if_missing(&root.join(".env.example"), ENV_EXAMPLE)?;
    write_if_missing(&root.join("dbfsync.toml"), PROJECT_CONFIG)?;
    write_if_missing(&feeds_dir.join("production_orders.toml"), EXAMPLE_FEED)?;

    // Keep secrets and local state out of version control
    let gitignore = root.join(".gitignore");
    if gitignore.exists() {
        let content = fs::read_to_string(&gitignore)?;
        if !content.contains(".env") {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore)?;
            writeln!(file, "\n# dbfsync\n.env\ndbfsync_state.json*")?;
            println!("Added .env to .gitignore");
        }
    } else {
        fs::write(&gitignore, "# dbfsync\n.env\ndbfsync_state.json*\n")?;
        println!("Created .gitignore with .env");
    }

    Ok(())
}
