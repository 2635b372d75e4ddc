/// Scheduler Service
/// Runs remote synchronization on a schedule using cron expressions.
/// Pulled documents are handed back to the owner of the local store.
use crate::error::{AppError, Result};
use crate::sync::{SyncOutcome, SyncService};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Sync frequency options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFrequency {
    Minutes(u32),
    Hours(u32),
}

impl SyncFrequency {
    /// Convert frequency to cron expression
    pub fn to_cron(self) -> String {
        match self {
            SyncFrequency::Minutes(1) => "0 * * * * *".to_string(),
            SyncFrequency::Minutes(m) => format!("0 */{} * * * *", m),
            SyncFrequency::Hours(1) => "0 0 * * * *".to_string(),
            SyncFrequency::Hours(h) => format!("0 0 */{} * * *", h),
        }
    }
}

impl FromStr for SyncFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Formats: "15m", "2h" or "hourly"
        let s = s.trim().to_lowercase();

        if s == "hourly" {
            return Ok(SyncFrequency::Hours(1));
        }

        let Some(unit) = s.chars().last() else {
            return Err("Empty frequency string".to_string());
        };
        let number_part = &s[..s.len() - unit.len_utf8()];

        let value: u32 = number_part
            .parse()
            .map_err(|_| format!("Invalid number in frequency: {}", s))?;

        if value == 0 {
            return Err("Frequency value must be greater than 0".to_string());
        }

        match unit {
            'm' if value < 60 => Ok(SyncFrequency::Minutes(value)),
            'm' => Err(format!("Use hours for intervals of 60 minutes or more: {}", s)),
            'h' if value <= 24 => Ok(SyncFrequency::Hours(value)),
            'h' => Err(format!("Hour interval must be at most 24: {}", s)),
            _ => Err(format!(
                "Invalid frequency unit '{}'. Use 'm' (minutes) or 'h' (hours)",
                unit
            )),
        }
    }
}

/// Scheduler service for automatic synchronization
pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    sync_service: Arc<SyncService>,
    pulled: mpsc::UnboundedSender<Value>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
}

impl SyncScheduler {
    /// Create new scheduler service
    pub async fn new(
        sync_service: Arc<SyncService>,
        pulled: mpsc::UnboundedSender<Value>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            sync_service,
            pulled,
            current_job_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Sync scheduler started");
        Ok(())
    }

    /// Schedule automatic sync, replacing any existing schedule
    pub async fn schedule_sync(&self, frequency: SyncFrequency, enabled: bool) -> Result<()> {
        self.cancel_sync().await?;

        if !enabled {
            tracing::info!("Automatic sync disabled");
            return Ok(());
        }

        let cron_expr = frequency.to_cron();
        let sync_service = Arc::clone(&self.sync_service);
        let pulled = self.pulled.clone();

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let sync_service = Arc::clone(&sync_service);
            let pulled = pulled.clone();
            Box::pin(async move {
                tracing::debug!("Running scheduled sync");
                run_and_forward(&sync_service, &pulled).await;
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create sync job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        let mut current_job = self.current_job_id.write().await;
        *current_job = Some(job_id);

        tracing::info!("Automatic sync scheduled: {:?} ({})", frequency, cron_expr);
        Ok(())
    }

    /// Trigger a sync now, outside the schedule
    pub async fn sync_now(&self) {
        run_and_forward(&self.sync_service, &self.pulled).await;
    }

    /// Cancel scheduled sync
    pub async fn cancel_sync(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = *current_job {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;

            *current_job = None;
            tracing::info!("Automatic sync schedule cancelled");
        }

        Ok(())
    }

    pub async fn is_scheduled(&self) -> bool {
        self.current_job_id.read().await.is_some()
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Sync scheduler shutdown");
        Ok(())
    }
}

/// One sync run; a pulled document goes to the store owner
async fn run_and_forward(sync_service: &SyncService, pulled: &mpsc::UnboundedSender<Value>) {
    match sync_service.sync_once().await {
        Ok(SyncOutcome::Pulled(document)) => {
            if pulled.send(document).is_err() {
                tracing::warn!("Store owner gone, dropping pulled document");
            }
        }
        Ok(_) => {}
        // Already logged and recorded by the sync service
        Err(_) => {}
    }
}
