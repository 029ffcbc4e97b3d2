//! Server command implementation

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    static_dir: Option<&Path>,
    storage_dir: &Path,
) -> Result<()> {
    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Statement files: {}", storage_dir.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    // Comma-separated API keys for service callers
    let api_keys = tally_server::parse_list(&std::env::var("TALLY_API_KEYS").unwrap_or_default());
    let allowed_origins =
        tally_server::parse_list(&std::env::var("TALLY_ALLOWED_ORIGINS").unwrap_or_default());
    let draft_debounce = std::env::var("TALLY_DRAFT_DEBOUNCE_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(500));

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!("   🔒 Authentication: identity header (x-auth-user-email)");
        if !api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured (TALLY_API_KEYS)",
                api_keys.len()
            );
        }
    }
    if !allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", allowed_origins.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = tally_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
        storage_dir: storage_dir.to_path_buf(),
        draft_debounce,
    };

    let static_dir_str = static_dir
        .map(|p| {
            p.to_str()
                .ok_or_else(|| anyhow!("static_dir path must be valid UTF-8"))
        })
        .transpose()?;
    tally_server::serve_with_config(db, host, port, static_dir_str, config).await?;

    Ok(())
}
