use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upload rate-limit window tracked per client key.
///
/// Persisted in the store and updated inside the same write transaction
/// as the upload it guards, so concurrent requests cannot slip past the
/// caps the way an in-process map would allow after a restart or behind
/// multiple replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadWindow {
    /// Uploads admitted in the current hour window
    pub uploads_this_hour: u32,
    /// Uploads admitted in the current day window
    pub uploads_today: u32,
    /// Unix timestamp of the last admitted upload
    pub last_upload_at: Option<i64>,
    /// Unix timestamp when the hourly counter resets
    pub hour_reset_at: i64,
    /// Unix timestamp when the daily counter resets
    pub day_reset_at: i64,
}

impl UploadWindow {
    /// Create a fresh window with initial reset times
    pub fn new(now: i64) -> Self {
        Self {
            uploads_this_hour: 0,
            uploads_today: 0,
            last_upload_at: None,
            hour_reset_at: now + 3600,
            day_reset_at: now + 86400,
        }
    }

    /// Check the caps and count one upload if allowed.
    /// Returns Err(RateLimitExceeded) when either cap is hit.
    pub fn check_and_increment(&mut self, now: i64, per_hour: u32, per_day: u32) -> Result<()> {
        if now >= self.hour_reset_at {
            self.uploads_this_hour = 0;
            self.hour_reset_at = now + 3600;
        }

        if now >= self.day_reset_at {
            self.uploads_today = 0;
            self.day_reset_at = now + 86400;
        }

        if self.uploads_this_hour >= per_hour {
            tracing::warn!(
                "Hourly upload limit would be exceeded: {}/{}",
                self.uploads_this_hour,
                per_hour
            );
            return Err(AppError::RateLimitExceeded);
        }

        if self.uploads_today >= per_day {
            tracing::warn!(
                "Daily upload limit would be exceeded: {}/{}",
                self.uploads_today,
                per_day
            );
            return Err(AppError::RateLimitExceeded);
        }

        self.uploads_this_hour += 1;
        self.uploads_today += 1;
        self.last_upload_at = Some(now);

        Ok(())
    }
}
