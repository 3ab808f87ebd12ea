use relational_import::infra::config::{self, DatabaseConfig, ServerConfig};
use relational_import::infra::telemetry;
use relational_import::{PgStore, Store};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight\n\
         \n\
         Requires either:\n\
           DATABASE_URL\n\
         or:\n\
           DB_USER, DB_PASSWORD, DB_NAME (+ DB_HOST, DB_PORT, DB_SSL_ROOT_CERT)\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    telemetry::init_tracing(false).ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }

    // Force-read config (nice error messages if missing)
    let db = DatabaseConfig::from_env()?;
    let server = ServerConfig::from_env()?;

    println!("> Preflight:");
    println!("  database={}", db.describe());
    println!(
        "  pool: size={} overflow={} recycle={}s pre_ping={} timeout={}s",
        db.pool.pool_size,
        db.pool.max_overflow,
        db.pool.recycle.as_secs(),
        db.pool.pre_ping,
        db.pool.acquire_timeout.as_secs()
    );
    println!("  API_BIND_ADDR={}", server.bind_addr);
    match server.load_timeout {
        Some(t) => println!("  LOAD_TIMEOUT_SECS={}", t.as_secs()),
        None => println!("  LOAD_TIMEOUT_SECS unset (no limit)"),
    }

    let store = PgStore::connect(&db).await?;
    store.ping().await?;
    println!("  Connection OK.");

    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(store.pool())
        .await?;
    println!("  Server: {}", version);

    let tables = store.list_tables().await?;
    if tables.is_empty() {
        println!("  No tables yet.");
    } else {
        println!("  Tables:");
        for t in &tables {
            println!("    - {}", t);
        }
    }

    let specs = store.registry().await.specs();
    if specs.is_empty() {
        println!("  No registered models. Run a demo or POST /bootstrap/apply-schema.");
    } else {
        println!("  Registered models:");
        for spec in &specs {
            println!(
                "    - {} ({} columns, {} rows)",
                spec.table_name,
                spec.columns.len(),
                store.count(&spec.table_name).await?
            );
        }
    }

    println!("> Preflight OK.");
    Ok(())
}
