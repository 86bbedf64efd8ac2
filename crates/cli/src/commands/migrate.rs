use tablebell_core::config::LoadOptions;
use tablebell_db::migrations;

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

pub fn run(options: &LoadOptions) -> CommandResult {
    let result = load_config(options).and_then(|config| {
        block_on(async move {
            let pool = open_pool(&config).await?;
            let pending = migrations::pending_versions(&pool).await.map_err(Failure::migration)?;
            migrations::run_pending(&pool).await.map_err(Failure::migration)?;
            pool.close().await;

            Ok(match pending.len() {
                0 => "schema already up to date".to_string(),
                applied => format!("applied {applied} pending migration(s)"),
            })
        })
    });

    CommandResult::finish("migrate", result)
}
