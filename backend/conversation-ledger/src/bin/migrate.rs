use conversation_ledger::{config::Config, db, logging};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    logging::init_tracing(cfg.log_format);

    let pool = db::init_pool(&cfg.database_url, cfg.db_max_connections).await?;
    db::MIGRATOR.run(&pool).await?;

    info!("conversation-ledger migrations applied");
    Ok(())
}
