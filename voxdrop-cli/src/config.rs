use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Local, NaiveDate, Utc};
use voxdrop_core::{ContainerId, PipelineConfig, RetryPolicy, StagingConfig, TransferConfig};
use voxdrop_drive::DriveConfig;

/// Settings read from the environment (after `.env` is loaded)
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub drive_token: Option<String>,
    pub regular_folder: Option<String>,
    pub kickstart_folder: Option<String>,
    pub default_folder: Option<String>,
    pub max_attempts: Option<u32>,
    /// None disables the transfer deadline
    pub deadline: Option<Duration>,
    pub memory_threshold_bytes: Option<u64>,
    pub spill_dir: Option<PathBuf>,
    pub link_template: Option<String>,
    /// Offset used for the default meeting date. None uses the local zone.
    pub utc_offset: Option<FixedOffset>,
    pub api_base: Option<String>,
    pub upload_base: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let max_attempts = get("VOXDROP_MAX_ATTEMPTS")
            .map(|v| v.parse::<u32>().context("VOXDROP_MAX_ATTEMPTS must be a positive integer"))
            .transpose()?;
        if max_attempts == Some(0) {
            return Err(anyhow!("VOXDROP_MAX_ATTEMPTS must be at least 1"));
        }

        let deadline_secs = get("VOXDROP_DEADLINE_SECS")
            .unwrap_or_else(|| "900".to_string())
            .parse::<u64>()
            .context("VOXDROP_DEADLINE_SECS must be a number of seconds")?;

        let memory_threshold_bytes = get("VOXDROP_MEMORY_THRESHOLD_BYTES")
            .map(|v| v.parse::<u64>().context("VOXDROP_MEMORY_THRESHOLD_BYTES must be a byte count"))
            .transpose()?;

        let utc_offset = get("VOXDROP_UTC_OFFSET")
            .map(|v| {
                v.parse::<FixedOffset>()
                    .map_err(|e| anyhow!("VOXDROP_UTC_OFFSET must look like +05:30: {}", e))
            })
            .transpose()?;

        Ok(Self {
            drive_token: get("VOXDROP_DRIVE_TOKEN"),
            regular_folder: get("REGULAR_FOLDER_ID"),
            kickstart_folder: get("KICKSTART_FOLDER_ID"),
            default_folder: get("AUDIO_DRIVE_FOLDER_ID"),
            max_attempts,
            deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
            memory_threshold_bytes,
            spill_dir: get("VOXDROP_SPILL_DIR").map(PathBuf::from),
            link_template: get("VOXDROP_LINK_TEMPLATE"),
            utc_offset,
            api_base: get("VOXDROP_DRIVE_API_BASE"),
            upload_base: get("VOXDROP_DRIVE_UPLOAD_BASE"),
        })
    }

    /// Destination container: an explicit id wins, then the meeting type
    /// (`regular` or anything else), then the default folder.
    pub fn folder_for(&self, meeting_type: Option<&str>, explicit: Option<&str>) -> Result<ContainerId> {
        if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
            return Ok(ContainerId::new(id));
        }

        let (id, var) = match meeting_type {
            Some(kind) if kind.trim().eq_ignore_ascii_case("regular") => {
                (self.regular_folder.as_deref(), "REGULAR_FOLDER_ID")
            }
            Some(_) => (self.kickstart_folder.as_deref(), "KICKSTART_FOLDER_ID"),
            None => (self.default_folder.as_deref(), "AUDIO_DRIVE_FOLDER_ID"),
        };

        id.map(ContainerId::new)
            .ok_or_else(|| anyhow!("Missing {} (or pass --folder)", var))
    }

    /// Today's date in the configured offset
    pub fn today(&self) -> NaiveDate {
        match self.utc_offset {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => Local::now().date_naive(),
        }
    }

    pub fn pipeline_config(&self, detect_mime: bool) -> PipelineConfig {
        let mut retry = RetryPolicy::default();
        if let Some(max) = self.max_attempts {
            retry = retry.with_max_attempts(max);
        }

        let mut staging = StagingConfig::default();
        if let Some(bytes) = self.memory_threshold_bytes {
            staging = staging.with_memory_threshold(bytes);
        }
        if let Some(dir) = &self.spill_dir {
            staging = staging.with_spill_dir(dir.clone());
        }

        let mut config = PipelineConfig::default()
            .with_transfer(TransferConfig::default().with_retry(retry))
            .with_staging(staging);
        if let Some(deadline) = self.deadline {
            config = config.with_deadline(deadline);
        }
        if let Some(template) = &self.link_template {
            config = config.with_link_template(template.as_str());
        }
        if detect_mime {
            config = config.detect_mime();
        }
        config
    }

    pub fn drive_config(&self) -> Result<DriveConfig> {
        let token = self
            .drive_token
            .clone()
            .ok_or_else(|| anyhow!("Missing VOXDROP_DRIVE_TOKEN"))?;

        let mut config = DriveConfig::new(token);
        if let Some(base) = &self.api_base {
            config = config.with_api_base(base.as_str());
        }
        if let Some(base) = &self.upload_base {
            config = config.with_upload_base(base.as_str());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.deadline, Some(Duration::from_secs(900)));
        assert_eq!(s.max_attempts, None);

        let cfg = s.pipeline_config(false);
        assert_eq!(cfg.staging.memory_threshold_bytes, 8 * 1024 * 1024);
        assert_eq!(cfg.transfer.retry.max_attempts, None);
        assert!(!cfg.detect_mime);
    }

    #[test]
    fn meeting_type_routes_folders() {
        let s = settings(&[
            ("REGULAR_FOLDER_ID", "reg"),
            ("KICKSTART_FOLDER_ID", "kick"),
            ("AUDIO_DRIVE_FOLDER_ID", "audio"),
        ])
        .unwrap();

        assert_eq!(s.folder_for(Some("Regular"), None).unwrap().as_str(), "reg");
        assert_eq!(s.folder_for(Some("Kickstart"), None).unwrap().as_str(), "kick");
        assert_eq!(s.folder_for(Some("Onboarding"), None).unwrap().as_str(), "kick");
        assert_eq!(s.folder_for(None, None).unwrap().as_str(), "audio");
        assert_eq!(s.folder_for(Some("Regular"), Some("manual")).unwrap().as_str(), "manual");
    }

    #[test]
    fn missing_folder_names_the_variable() {
        let s = settings(&[]).unwrap();
        let err = s.folder_for(Some("Regular"), None).unwrap_err();
        assert!(err.to_string().contains("REGULAR_FOLDER_ID"));
    }

    #[test]
    fn numeric_settings_are_validated() {
        assert!(settings(&[("VOXDROP_MAX_ATTEMPTS", "zero")]).is_err());
        assert!(settings(&[("VOXDROP_MAX_ATTEMPTS", "0")]).is_err());

        let s = settings(&[("VOXDROP_MAX_ATTEMPTS", "5"), ("VOXDROP_DEADLINE_SECS", "0")]).unwrap();
        assert_eq!(s.max_attempts, Some(5));
        assert_eq!(s.deadline, None);
        assert_eq!(s.pipeline_config(false).transfer.retry.max_attempts, Some(5));
    }

    #[test]
    fn default_date_follows_the_configured_offset() {
        let s = settings(&[("VOXDROP_UTC_OFFSET", "+05:30")]).unwrap();
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(s.utc_offset, Some(offset));
        assert_eq!(s.today(), Utc::now().with_timezone(&offset).date_naive());

        assert!(settings(&[("VOXDROP_UTC_OFFSET", "IST")]).is_err());
        assert_eq!(settings(&[]).unwrap().utc_offset, None);
    }

    #[test]
    fn drive_config_needs_a_token() {
        assert!(settings(&[]).unwrap().drive_config().is_err());

        let s = settings(&[
            ("VOXDROP_DRIVE_TOKEN", "ya29.token"),
            ("VOXDROP_DRIVE_API_BASE", "http://localhost:9000/drive/v3/"),
        ])
        .unwrap();
        let cfg = s.drive_config().unwrap();
        assert_eq!(cfg.api_base, "http://localhost:9000/drive/v3");
    }
}
