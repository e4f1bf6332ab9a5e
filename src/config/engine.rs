use crate::search::MatchMode;
use crate::util::math::secs;
use crate::util::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Symmetric multiplier sweep around the base scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSweep {
    /// Center multiplier.
    pub center: f32,
    /// Half-width of the sweep.
    pub range: f32,
    /// Number of multipliers (1 means center only).
    pub steps: u32,
}

impl Default for ScaleSweep {
    fn default() -> Self {
        Self {
            center: 1.0,
            range: 0.0,
            steps: 1,
        }
    }
}

/// Window-relative scaling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSettings {
    /// Window width the templates were captured at; enables window scaling.
    pub reference_width: Option<u32>,
    /// Optional multi-scale sweep.
    pub sweep: Option<ScaleSweep>,
}

/// Capture backend selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Preferred backend name.
    pub method: String,
    /// Downscale applied to every captured frame (1.0 = native).
    pub scale: f32,
    /// Consecutive failures before the scheduler halts.
    pub max_failures: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            method: "monitor".to_string(),
            scale: 1.0,
            max_failures: 30,
        }
    }
}

/// Reduced check rate after a period without clicks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoSettings {
    pub enabled: bool,
    pub idle_after_secs: f64,
    pub interval_secs: f64,
}

impl Default for EcoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_after_secs: 60.0,
            interval_secs: 1.0,
        }
    }
}

/// Perceptual-hash stability gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    pub enabled: bool,
    /// Maximum Hamming distance between the oldest and newest hash.
    pub threshold: u32,
    /// Side of the square corner crop that is hashed, in frame pixels.
    pub crop_size: u32,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
            crop_size: 64,
        }
    }
}

/// Priority episode timeouts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrioritySettings {
    /// No-activity timeout for image- and sequence-gated episodes.
    pub activity_timeout_secs: f64,
}

impl Default for PrioritySettings {
    fn default() -> Self {
        Self {
            activity_timeout_secs: 10.0,
        }
    }
}

/// Quick timer behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickTimerSettings {
    /// Seconds past target after which an unmatched entry is dropped.
    pub grace_secs: f64,
    /// Default match threshold.
    pub threshold: f32,
}

impl Default for QuickTimerSettings {
    fn default() -> Self {
        Self {
            grace_secs: 5.0,
            threshold: 0.85,
        }
    }
}

/// Click execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    pub activate_retries: u32,
    pub activate_delay_ms: u64,
    /// Block user input while a click is delivered.
    pub block_input: bool,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            activate_retries: 3,
            activate_delay_ms: 50,
            block_input: true,
        }
    }
}

/// Watchdog for the controlled application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub enabled: bool,
    /// Case-insensitive substrings matched against process name and executable path.
    pub process_markers: Vec<String>,
    /// Program used to relaunch the application; the tracked executable when unset.
    pub relaunch_command: Option<PathBuf>,
    pub relaunch_args: Vec<String>,
    /// Consecutive clicks on one path that count as unresponsive.
    pub stall_clicks: u32,
    /// Seconds to wait after relaunch before looking for the window.
    pub startup_wait_secs: f64,
    /// Seconds to poll for the relaunched window.
    pub window_timeout_secs: f64,
    /// Seconds between liveness checks.
    pub check_interval_secs: f64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            process_markers: Vec::new(),
            relaunch_command: None,
            relaunch_args: Vec::new(),
            stall_clicks: 20,
            startup_wait_secs: 5.0,
            window_timeout_secs: 30.0,
            check_interval_secs: 2.0,
        }
    }
}

/// All engine tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    /// Frames skipped between two checks.
    pub skip_frames: u32,
    pub eco: EcoSettings,
    pub capture: CaptureSettings,
    pub scale: ScaleSettings,
    pub match_mode: MatchMode,
    /// Row-parallel correlation.
    pub parallel: bool,
    pub min_var_i: f32,
    pub stability: StabilitySettings,
    pub ocr_rearm_secs: f64,
    pub priority: PrioritySettings,
    /// Throttle applied after a countdown click.
    pub countdown_cooldown_secs: f64,
    pub quick_timer: QuickTimerSettings,
    pub action: ActionSettings,
    pub lifecycle: LifecycleSettings,
    pub workers: usize,
    pub stop_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            skip_frames: 0,
            eco: EcoSettings::default(),
            capture: CaptureSettings::default(),
            scale: ScaleSettings::default(),
            match_mode: MatchMode::Color,
            parallel: true,
            min_var_i: 1e-8,
            stability: StabilitySettings::default(),
            ocr_rearm_secs: 2.0,
            priority: PrioritySettings::default(),
            countdown_cooldown_secs: 1.0,
            quick_timer: QuickTimerSettings::default(),
            action: ActionSettings::default(),
            lifecycle: LifecycleSettings::default(),
            workers: 4,
            stop_timeout_ms: 2000,
        }
    }
}

impl EngineSettings {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick_interval_ms must be positive".into(),
            ));
        }
        if !(self.capture.scale.is_finite() && self.capture.scale > 0.0) {
            return Err(EngineError::InvalidConfig(
                "capture.scale must be positive".into(),
            ));
        }
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig("workers must be positive".into()));
        }
        if let Some(sweep) = &self.scale.sweep {
            if !(sweep.center.is_finite() && sweep.center > 0.0 && sweep.range >= 0.0) {
                return Err(EngineError::InvalidConfig(
                    "scale.sweep needs a positive center and a non-negative range".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ocr_rearm(&self) -> Duration {
        secs(self.ocr_rearm_secs)
    }

    pub fn activity_timeout(&self) -> Duration {
        secs(self.priority.activity_timeout_secs)
    }

    pub fn countdown_cooldown(&self) -> Duration {
        secs(self.countdown_cooldown_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineSettings;
    use crate::search::MatchMode;

    #[test]
    fn partial_documents_fill_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"match_mode":"strict_color","capture":{"scale":0.5}}"#)
                .unwrap();
        assert_eq!(settings.match_mode, MatchMode::StrictColor);
        assert_eq!(settings.capture.scale, 0.5);
        assert_eq!(settings.capture.method, "monitor");
        assert_eq!(settings.tick_interval_ms, 50);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_capture_scale() {
        let mut settings = EngineSettings::default();
        settings.capture.scale = 0.0;
        assert!(settings.validate().is_err());
    }
}
