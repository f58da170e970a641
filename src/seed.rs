use anyhow::Context;
use chrono::NaiveDateTime;
use log::{info, warn};
use rand::Rng;

use crate::app_config::Settings;
use crate::data::model::{Batch, WriteReport};
use crate::generator::generate;
use crate::service::Gateway;

/// Row counts of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub users: usize,
    pub events: usize,
    pub orders: usize,
    pub inserted: WriteReport,
}

impl Summary {
    fn new(batch: &Batch, inserted: WriteReport) -> Self {
        Self {
            users: batch.users.len(),
            events: batch.events.len(),
            orders: batch.orders.len(),
            inserted,
        }
    }

    pub fn skipped(&self) -> u64 {
        let generated = (self.users + self.events + self.orders) as u64;
        generated.saturating_sub(self.inserted.users + self.inserted.events + self.inserted.orders)
    }
}

async fn generate_and_write<R: Rng + ?Sized>(
    gateway: &dyn Gateway,
    settings: &Settings,
    rng: &mut R,
    now: NaiveDateTime,
) -> Result<Summary, anyhow::Error> {
    let bases = gateway
        .next_ids()
        .await
        .context("failed to read id bases")?;
    info!(
        "next ids: user_id={}, event_id={}, order_id={}",
        bases.user, bases.event, bases.order
    );

    let batch = generate(settings, bases, rng, now)?;
    info!(
        "Generated: users={}, events={}, orders={}",
        batch.users.len(),
        batch.events.len(),
        batch.orders.len()
    );

    let inserted = gateway
        .write(&batch)
        .await
        .context("failed to write generated rows")?;
    let summary = Summary::new(&batch, inserted);
    if summary.skipped() > 0 {
        warn!(
            "{} rows already present and skipped (inserted users={}, events={}, orders={})",
            summary.skipped(),
            inserted.users,
            inserted.events,
            inserted.orders
        );
    }
    info!("Insert complete.");
    Ok(summary)
}

/// One seeding run: read id bases, generate, write in one transaction.
/// The gateway is closed afterwards whether or not the run succeeded.
pub async fn run<R: Rng + ?Sized>(
    gateway: &dyn Gateway,
    settings: &Settings,
    rng: &mut R,
    now: NaiveDateTime,
) -> Result<Summary, anyhow::Error> {
    let result = generate_and_write(gateway, settings, rng, now).await;
    gateway.close().await;
    result
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    use super::*;
    use crate::generator::ids::IdBases;
    use crate::generator::tests::fixed_now;
    use crate::service::local::LocalService;
    use crate::service::MockGateway;

    fn settings() -> Settings {
        Settings {
            n_new_users: 40,
            ..Settings::default()
        }
    }

    fn everything_inserted(batch: &Batch) -> WriteReport {
        WriteReport {
            users: batch.users.len() as u64,
            events: batch.events.len() as u64,
            orders: batch.orders.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_run_writes_once_from_allocated_ids() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_next_ids()
            .times(1)
            .returning(|| Ok(IdBases::from_maxima(100, 5000, 900)));
        gateway
            .expect_write()
            .times(1)
            .withf(|batch| {
                batch.users[0].user_id == 101
                    && batch.events[0].event_id == 5001
                    && batch.orders.first().map_or(true, |o| o.order_id == 901)
            })
            .returning(|batch| Ok(everything_inserted(batch)));
        gateway.expect_close().times(1).return_const(());

        let mut rng = StdRng::seed_from_u64(42);
        let summary = run(&gateway, &settings(), &mut rng, fixed_now())
            .await
            .unwrap();

        assert_eq!(summary.users, 40);
        assert_eq!(summary.skipped(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_skips_generation() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_next_ids()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        gateway.expect_write().never();
        gateway.expect_close().times(1).return_const(());

        let mut rng = StdRng::seed_from_u64(42);
        let err = run(&gateway, &settings(), &mut rng, fixed_now())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to read id bases"));
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_write_failure_propagates_and_closes() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_next_ids()
            .returning(|| Ok(IdBases::from_maxima(0, 0, 0)));
        gateway
            .expect_write()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("duplicate column")));
        gateway.expect_close().times(1).return_const(());

        let mut rng = StdRng::seed_from_u64(1);
        let result = run(&gateway, &settings(), &mut rng, fixed_now()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_skipped_rows_are_counted() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_next_ids()
            .returning(|| Ok(IdBases::from_maxima(0, 0, 0)));
        gateway
            .expect_write()
            .returning(|_| Ok(WriteReport::default()));
        gateway.expect_close().return_const(());

        let mut rng = StdRng::seed_from_u64(2);
        let summary = run(&gateway, &settings(), &mut rng, fixed_now())
            .await
            .unwrap();

        assert_eq!(
            summary.skipped(),
            (summary.users + summary.events + summary.orders) as u64
        );
    }

    #[tokio::test]
    async fn test_consecutive_local_runs_continue_ids() {
        let dir = tempdir().unwrap();
        let svc = LocalService::init(dir.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let first = run(&svc, &settings(), &mut rng, fixed_now()).await.unwrap();
        let second = run(&svc, &settings(), &mut rng, fixed_now()).await.unwrap();

        assert_eq!(first.skipped(), 0);
        assert_eq!(second.skipped(), 0);
        let bases = svc.next_ids().await.unwrap();
        assert_eq!(bases.user, 81);
        assert_eq!(bases.event as usize, first.events + second.events + 1);
        assert_eq!(bases.order as usize, first.orders + second.orders + 1);
    }
}
