// SPDX-License-Identifier: CEPL-1.0
use crate::error::{PresentError, PresentResult};

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of the fence/semaphore ring, i.e. how many frames may have GPU
    /// work outstanding at once.
    pub frames_in_flight: usize,
    /// Enable VK_LAYER_KHRONOS_validation + a debug messenger routed to tracing.
    pub validation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            validation: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by LUMEN_FRAMES_IN_FLIGHT and LUMEN_VALIDATION.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = var("LUMEN_FRAMES_IN_FLIGHT").and_then(|s| s.trim().parse().ok()) {
            self.frames_in_flight = n;
        }
        if let Some(v) = var("LUMEN_VALIDATION") {
            self.validation = matches!(v.trim(), "1" | "true" | "on");
        }
        self
    }

    pub fn with_frames_in_flight(mut self, n: usize) -> Self {
        self.frames_in_flight = n;
        self
    }

    pub fn validate(&self) -> PresentResult<()> {
        if self.frames_in_flight == 0 {
            return Err(PresentError::Config(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_three_frames() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.frames_in_flight, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = EngineConfig::default().with_overrides(|k| match k {
            "LUMEN_FRAMES_IN_FLIGHT" => Some(" 2 ".into()),
            "LUMEN_VALIDATION" => Some("0".into()),
            _ => None,
        });
        assert_eq!(cfg.frames_in_flight, 2);
        assert!(!cfg.validation);
    }

    #[test]
    fn garbage_frame_count_is_ignored() {
        let cfg = EngineConfig::default().with_overrides(|k| {
            (k == "LUMEN_FRAMES_IN_FLIGHT").then(|| "many".to_string())
        });
        assert_eq!(cfg.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn zero_frames_rejected() {
        let cfg = EngineConfig::default().with_frames_in_flight(0);
        assert!(matches!(cfg.validate(), Err(PresentError::Config(_))));
    }
}
