//! Break scheduler — triggers break generation on a configurable interval.
//!
//! Grounded on `original_source/core/services/scheduler.py`. The original is a
//! singleton with a `prepare_break_fn` callback set after construction; here the
//! trigger closure is supplied at construction time and the loop itself is a
//! `tokio::task::JoinHandle` aborted on `stop()` rather than a cancelled
//! `asyncio.Task`, since abort is the idiomatic tokio equivalent.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

type TriggerFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_trigger: Option<String>,
    pub next_trigger: Option<String>,
}

struct SchedulerState {
    running: bool,
    last_trigger: Option<DateTime<Utc>>,
    next_trigger: Option<DateTime<Utc>>,
}

pub struct BreakScheduler {
    pool: SqlitePool,
    trigger: TriggerFn,
    state: Arc<RwLock<SchedulerState>>,
    handle: RwLock<Option<JoinHandle<()>>>,
}

impl BreakScheduler {
    pub fn new(pool: SqlitePool, trigger: TriggerFn) -> Self {
        Self {
            pool,
            trigger,
            state: Arc::new(RwLock::new(SchedulerState {
                running: false,
                last_trigger: None,
                next_trigger: None,
            })),
            handle: RwLock::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write().await;
            if state.running {
                return;
            }
            state.running = true;
        }

        let this = Arc::clone(self);
        let join = tokio::spawn(async move { this.run_loop().await });
        *self.handle.write().await = Some(join);
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if !state.running {
                return;
            }
            state.running = false;
        }
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.read().await;
        SchedulerStatus {
            running: state.running,
            last_trigger: state.last_trigger.map(|t| t.to_rfc3339()),
            next_trigger: state.next_trigger.map(|t| t.to_rfc3339()),
        }
    }

    async fn run_loop(self: Arc<Self>) {
        tracing::info!("scheduler started");
        let mut first_run = true;

        loop {
            if !self.state.read().await.running {
                break;
            }

            let interval_minutes = self.interval_minutes().await;

            if first_run {
                first_run = false;
                tracing::info!("scheduler first run — triggering immediately");
            } else {
                let next = Utc::now() + chrono::Duration::minutes(interval_minutes as i64);
                self.state.write().await.next_trigger = Some(next);
                tokio::time::sleep(std::time::Duration::from_secs(interval_minutes as u64 * 60)).await;
            }

            if !self.state.read().await.running {
                break;
            }

            if self.is_quiet_mode().await {
                tracing::info!("quiet mode active, skipping break");
                continue;
            }

            self.state.write().await.last_trigger = Some(Utc::now());
            tracing::info!("triggering break generation");
            let fut = (self.trigger)();
            tokio::spawn(fut);
        }

        tracing::info!("scheduler stopped");
    }

    async fn interval_minutes(&self) -> u32 {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = 'break_interval_minutes'")
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse::<u32>().ok())
            .map(|v| v.max(1))
            .unwrap_or(15)
    }

    async fn is_quiet_mode(&self) -> bool {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = 'quiet_mode'")
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_trigger() -> (TriggerFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let trigger: TriggerFn = Arc::new(move || {
            let counted = counted.clone();
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
            })
        });
        (trigger, count)
    }

    #[tokio::test]
    async fn fires_immediately_on_first_start() {
        let pool = test_pool().await;
        let (trigger, count) = counting_trigger();
        let scheduler = Arc::new(BreakScheduler::new(pool, trigger));

        scheduler.start().await;
        // The first fire has no preceding sleep, so a short real wait is enough
        // for the spawned loop task and its spawned trigger future to run once.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let pool = test_pool().await;
        let (trigger, _count) = counting_trigger();
        let scheduler = Arc::new(BreakScheduler::new(pool, trigger));

        scheduler.start().await;
        assert!(scheduler.status().await.running);
        scheduler.start().await; // no-op: still exactly one loop task running
        assert!(scheduler.status().await.running);

        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let pool = test_pool().await;
        let (trigger, _count) = counting_trigger();
        let scheduler = Arc::new(BreakScheduler::new(pool, trigger));
        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn quiet_mode_skips_fire_without_stopping_the_loop() {
        let pool = test_pool().await;
        sqlx::query("UPDATE settings SET value = 'true' WHERE key = 'quiet_mode'")
            .execute(&pool)
            .await
            .unwrap();
        let scheduler = Arc::new(BreakScheduler::new(pool, {
            let (trigger, _count) = counting_trigger();
            trigger
        }));
        assert!(scheduler.is_quiet_mode().await);
    }
}
