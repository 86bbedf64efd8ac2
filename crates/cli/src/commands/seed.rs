use tablebell_core::config::LoadOptions;
use tablebell_db::{migrations, DemoSeed, SeedResult};

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure, EXIT_SEED};

pub fn run(options: &LoadOptions) -> CommandResult {
    let result = load_config(options).and_then(|config| {
        block_on(async move {
            let pool = open_pool(&config).await?;
            migrations::run_pending(&pool).await.map_err(Failure::migration)?;

            let seeded = DemoSeed::load(&pool)
                .await
                .map_err(|error| Failure::new("seed_execution", error, EXIT_SEED))?;
            let verification = DemoSeed::verify(&pool)
                .await
                .map_err(|error| Failure::new("seed_verification", error, EXIT_SEED))?;

            let outcome = if verification.all_present {
                Ok(summary(&seeded))
            } else {
                Err(verification_failure(&verification.checks))
            };
            pool.close().await;
            outcome
        })
    });

    CommandResult::finish("seed", result)
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo restaurant `{}` loaded with {} menu items and {} tables",
        seeded.restaurant_id, seeded.menu_items, seeded.tables
    )
}

fn verification_failure(checks: &[(&'static str, bool)]) -> Failure {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    let message = if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    };
    Failure::new("seed_verification", message, EXIT_SEED)
}

#[cfg(test)]
mod tests {
    use super::verification_failure;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("demo-restaurant", true), ("demo-menu", false), ("demo-seats", false)];

        let failure = verification_failure(&checks);
        assert_eq!(failure.class, "seed_verification");
        assert_eq!(failure.message, "Seed verification failed for checks: demo-menu, demo-seats");
        assert_eq!(failure.exit_code, 6);
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let failure = verification_failure(&[]);
        assert_eq!(failure.message, "Some seed data failed to load");
    }
}
