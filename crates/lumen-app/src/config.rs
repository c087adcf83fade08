// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use lumen_present::SurfaceSize;
use lumen_present_vk::EngineConfig;
use serde::Deserialize;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "lumen.toml")]
    pub config: PathBuf,
    /// Override present.frames_in_flight
    #[arg(long)]
    pub frames_in_flight: Option<usize>,
    /// Initial window width in physical pixels
    #[arg(long)]
    pub width: Option<u32>,
    /// Initial window height in physical pixels
    #[arg(long)]
    pub height: Option<u32>,
    /// Exit after this many acquire/present cycles
    #[arg(long)]
    pub max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WindowCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct PresentCfg {
    pub frames_in_flight: Option<usize>,
    pub validation: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    /// Pulse the clear colour so dropped or repeated frames are visible.
    #[serde(default = "default_animate")]
    pub animate: bool,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub present: PresentCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(skip)]
    pub max_frames: Option<u64>,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            animate: default_animate(),
        }
    }
}

fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_animate() -> bool {
    true
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => toml::from_str::<AppCfg>(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(_) => AppCfg::default(),
    }
}

impl AppCfg {
    /// Command-line flags win over the file.
    pub fn with_args(mut self, args: &Args) -> Self {
        if let Some(n) = args.frames_in_flight {
            self.present.frames_in_flight = Some(n);
        }
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        self.max_frames = args.max_frames;
        self
    }

    pub fn window_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.window.width, self.window.height)
    }

    /// Environment defaults (`LUMEN_*`), then this file/CLI on top.
    pub fn engine_config(&self) -> EngineConfig {
        let mut cfg = EngineConfig::from_env();
        if let Some(n) = self.present.frames_in_flight {
            cfg = cfg.with_frames_in_flight(n);
        }
        if let Some(v) = self.present.validation {
            cfg.validation = v;
        }
        cfg
    }
}
