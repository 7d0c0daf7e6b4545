//! Scroll-position sensor that asks for the next page.

use crate::error::{Error, Result};

/// Fraction of content height past which the next page is requested.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Geometry of a scroll container, in any consistent unit (pixels, rows).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
  pub offset:          f64,
  pub content_height:  f64,
  pub viewport_height: f64,
}

impl ScrollMetrics {
  pub fn new(offset: f64, content_height: f64, viewport_height: f64) -> Self {
    Self {
      offset,
      content_height,
      viewport_height,
    }
  }

  /// How far down the content the bottom of the viewport sits. Content that
  /// does not fill the viewport counts as fully viewed.
  pub fn viewed_fraction(&self) -> f64 {
    if self.content_height <= 0.0 {
      return 1.0;
    }
    (self.offset + self.viewport_height) / self.content_height
  }
}

/// Fires once the viewed fraction exceeds the threshold.
///
/// After firing the trigger is disarmed until the layout changes (the
/// content grows or shrinks, or the viewport is resized), and it never fires
/// twice within one frame.
#[derive(Debug, Clone)]
pub struct ScrollTrigger {
  threshold:  f64,
  armed:      bool,
  layout:     Option<(f64, f64)>,
  last_fired: Option<u64>,
}

impl Default for ScrollTrigger {
  fn default() -> Self {
    Self {
      threshold:  DEFAULT_THRESHOLD,
      armed:      true,
      layout:     None,
      last_fired: None,
    }
  }
}

impl ScrollTrigger {
  /// Returns [`Error::InvalidThreshold`] unless `0 < threshold <= 1`.
  pub fn new(threshold: f64) -> Result<Self> {
    if !(threshold > 0.0 && threshold <= 1.0) {
      return Err(Error::InvalidThreshold(threshold));
    }
    Ok(Self {
      threshold,
      ..Self::default()
    })
  }

  pub fn threshold(&self) -> f64 { self.threshold }

  /// Re-arm explicitly, e.g. after a failed fetch left the layout unchanged.
  pub fn rearm(&mut self) { self.armed = true; }

  /// Observe a scroll signal during animation frame `frame`. Returns `true`
  /// when the next page should be requested.
  pub fn observe(&mut self, metrics: ScrollMetrics, frame: u64) -> bool {
    let layout = (metrics.content_height, metrics.viewport_height);
    if self.layout != Some(layout) {
      self.layout = Some(layout);
      self.armed = true;
    }

    if !self.armed || self.last_fired == Some(frame) {
      return false;
    }
    if metrics.viewed_fraction() <= self.threshold {
      return false;
    }

    self.armed = false;
    self.last_fired = Some(frame);
    true
  }
}
