use anyhow::Result;
use real_return_analyzer_lib::{db, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    let db_path = settings.data_dir.join("cache.db");

    println!("Cache database: {:?}", db_path);
    if !db_path.exists() {
        println!("No cache database yet.");
        return Ok(());
    }

    let pool = db::init(&settings.data_dir).await?;

    if std::env::args().any(|a| a == "--purge-expired") {
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(settings.cpi_cache_ttl)?;
        let removed = db::purge_cache_before(&pool, cutoff).await?;
        println!("Removed {} entries older than {}", removed, cutoff);
    }

    let rows = db::list_cache_entries(&pool).await?;

    println!("{:<40} | {:>10} | {:<25}", "Key", "Bytes", "Stored at");
    println!("{}", "-".repeat(80));
    for (key, size, stored_at) in rows {
        println!("{:<40} | {:>10} | {:<25}", key, size, stored_at.to_rfc3339());
    }

    Ok(())
}
