//! Frame statistics
//!
//! Each rendered frame produces a [`FrameStats`] record listing the passes in
//! the order they ran, the draw calls each one issued and the passes that
//! were skipped with their reason.

use serde::{Deserialize, Serialize};

/// A pass of the frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassKind {
    /// Sun depth into the 2D shadow map
    DirectionalShadow,
    /// Cube depth of point light `n`
    PointShadow(usize),
    /// Cube depth of spot light `n`
    SpotShadow(usize),
    /// Background cube map
    Skybox,
    /// Lit scene into the default framebuffer
    Main,
    /// Light-perspective inset
    LightDebug,
}

impl PassKind {
    /// Depth-only passes
    pub fn is_shadow(&self) -> bool {
        matches!(
            self,
            PassKind::DirectionalShadow | PassKind::PointShadow(_) | PassKind::SpotShadow(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::DirectionalShadow => "directional_shadow",
            PassKind::PointShadow(_) => "point_shadow",
            PassKind::SpotShadow(_) => "spot_shadow",
            PassKind::Skybox => "skybox",
            PassKind::Main => "main",
            PassKind::LightDebug => "light_debug",
        }
    }
}

/// Why a pass did not run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The pass's program failed to compile or link
    ProgramUnavailable,
    /// The light has no usable shadow map
    ShadowDisabled,
    /// The spot light is switched off
    LightOff,
}

/// Outcome of one pass
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub kind: PassKind,
    /// Draw calls issued; 0 when skipped
    pub draw_calls: u32,
    pub skipped: Option<SkipReason>,
}

/// Per-frame record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Frame counter
    pub frame: u64,
    /// Sun orbit angle used for this frame
    pub sun_angle: f32,
    /// Every pass, in execution order
    pub passes: Vec<PassRecord>,
    /// Shadow maps rewritten this frame
    pub shadow_map_updates: u32,
    /// Point lights pushed to the lit program
    pub point_lights: usize,
    /// Spot lights pushed to the lit program
    pub spot_lights: usize,
    /// Lights with a usable shadow map
    pub shadowed_lights: usize,
}

impl FrameStats {
    pub fn new(frame: u64, sun_angle: f32) -> Self {
        Self {
            frame,
            sun_angle,
            ..Default::default()
        }
    }

    /// Record a pass that ran
    pub fn record(&mut self, kind: PassKind, draw_calls: u32) {
        if kind.is_shadow() {
            self.shadow_map_updates += 1;
        }
        self.passes.push(PassRecord {
            kind,
            draw_calls,
            skipped: None,
        });
    }

    /// Record a pass that did not run
    pub fn skip(&mut self, kind: PassKind, reason: SkipReason) {
        log::trace!("Skipping {} pass: {:?}", kind.name(), reason);
        self.passes.push(PassRecord {
            kind,
            draw_calls: 0,
            skipped: Some(reason),
        });
    }

    /// Record for a pass, if it was considered this frame
    pub fn pass(&self, kind: PassKind) -> Option<&PassRecord> {
        self.passes.iter().find(|record| record.kind == kind)
    }

    /// Whether a pass ran
    pub fn executed(&self, kind: PassKind) -> bool {
        self.pass(kind).map_or(false, |record| record.skipped.is_none())
    }

    /// Passes that ran, in order
    pub fn executed_order(&self) -> Vec<PassKind> {
        self.passes
            .iter()
            .filter(|record| record.skipped.is_none())
            .map(|record| record.kind)
            .collect()
    }

    /// Passes skipped
    pub fn skipped_count(&self) -> usize {
        self.passes.iter().filter(|record| record.skipped.is_some()).count()
    }

    /// Draw calls across all passes
    pub fn draw_calls(&self) -> u32 {
        self.passes.iter().map(|record| record.draw_calls).sum()
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "frame {}: {} passes ({} skipped), {} draws, {} shadow maps, \
             lights {}p/{}s ({} shadowed)",
            self.frame,
            self.passes.len(),
            self.skipped_count(),
            self.draw_calls(),
            self.shadow_map_updates,
            self.point_lights,
            self.spot_lights,
            self.shadowed_lights,
        )
    }

    /// Export as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_skip() {
        let mut stats = FrameStats::new(3, 0.5);
        stats.record(PassKind::DirectionalShadow, 4);
        stats.skip(PassKind::PointShadow(0), SkipReason::ShadowDisabled);
        stats.record(PassKind::Main, 4);

        assert_eq!(stats.shadow_map_updates, 1);
        assert_eq!(stats.skipped_count(), 1);
        assert_eq!(stats.draw_calls(), 8);
        assert!(stats.executed(PassKind::Main));
        assert!(!stats.executed(PassKind::PointShadow(0)));
        assert!(!stats.executed(PassKind::LightDebug));
        assert_eq!(
            stats.executed_order(),
            vec![PassKind::DirectionalShadow, PassKind::Main]
        );
    }

    #[test]
    fn test_pass_kind_classification() {
        assert!(PassKind::SpotShadow(1).is_shadow());
        assert!(!PassKind::Skybox.is_shadow());
        assert_eq!(PassKind::LightDebug.name(), "light_debug");
    }

    #[test]
    fn test_stats_json() {
        let mut stats = FrameStats::new(1, 0.0);
        stats.record(PassKind::Main, 2);
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"Main\""));
        let restored: FrameStats = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, stats);
        assert!(stats.summary().starts_with("frame 1:"));
    }
}
