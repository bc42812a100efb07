//! Camera configuration and fixed preview constants

use crate::device::OutputTarget;
use crate::error::CameraError;
use camfeed_frame::{Facing, PixelFormat};
use std::time::Duration;

pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;
pub const PREVIEW_FORMAT: PixelFormat = PixelFormat::Yuv420;
pub const BUFFER_DEPTH: usize = 3;
pub const RATE_INTERVAL: Duration = Duration::from_millis(1000);

const IDLE_BACKOFF: Duration = Duration::from_millis(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub preview_width: u32,
    pub preview_height: u32,
    pub format: PixelFormat,
    /// Images the frame source may hold at once
    pub buffer_depth: usize,
    /// Which camera to open; the first matching device wins
    pub facing: Facing,
    /// Throughput sampling interval
    pub rate_interval: Duration,
    /// Pipeline sleep when no frame is ready
    pub idle_backoff: Duration,
    /// How long `stop` waits for the pipeline worker
    pub join_timeout: Duration,
    /// Pin the pipeline worker to this CPU core
    pub worker_core: Option<usize>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preview_width: PREVIEW_WIDTH,
            preview_height: PREVIEW_HEIGHT,
            format: PREVIEW_FORMAT,
            buffer_depth: BUFFER_DEPTH,
            facing: Facing::Back,
            rate_interval: RATE_INTERVAL,
            idle_backoff: IDLE_BACKOFF,
            join_timeout: JOIN_TIMEOUT,
            worker_core: None,
        }
    }
}

impl CameraConfig {
    pub fn output_target(&self) -> OutputTarget {
        OutputTarget {
            width: self.preview_width,
            height: self.preview_height,
            format: self.format,
            max_images: self.buffer_depth,
        }
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        let reason = if self.preview_width == 0 || self.preview_height == 0 {
            "preview size must be non-zero"
        } else if self.buffer_depth == 0 {
            "buffer depth must be at least 1"
        } else if self.rate_interval.is_zero() {
            "rate interval must be non-zero"
        } else {
            return Ok(());
        };

        Err(CameraError::InvalidConfig {
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_preview_constants() {
        let config = CameraConfig::default();
        let target = config.output_target();

        assert_eq!((target.width, target.height), (640, 480));
        assert_eq!(target.format, PixelFormat::Yuv420);
        assert_eq!(target.max_images, 3);
        assert_eq!(config.rate_interval, Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = CameraConfig {
            buffer_depth: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CameraError::InvalidConfig { .. })
        ));

        let config = CameraConfig {
            preview_height: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
