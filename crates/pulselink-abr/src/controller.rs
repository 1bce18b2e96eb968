use pulselink_core::{BandwidthEstimate, QualityProfile};

use crate::types::AbrOptions;

/// What the controller decided this cycle, with the reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QualityAction {
    Hold,
    /// Eligible for step up but the stability requirement is not met yet.
    NotStableYet,
    StepUp,
    StepDown,
    /// Bitrate softly reduced, level unchanged.
    SoftReduce,
    /// Utilization so far over capacity that the profile jumps to `Low`.
    EmergencyDegrade,
}

/// Output of one control cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityDecision {
    pub profile: QualityProfile,
    pub target_bitrate_bps: u64,
    pub action: QualityAction,
    /// Utilization the decision was based on.
    pub utilization: f64,
}

/// Closed-loop quality controller with hysteresis.
///
/// Asymmetric by design: stepping up requires sustained headroom, stepping
/// down happens immediately. A false "improve" costs little; a false
/// "degrade" stalls the physiological signal.
#[derive(Clone, Debug)]
pub struct QualityController {
    opts: AbrOptions,
    profile: QualityProfile,
    target_bitrate_bps: f64,
    stable_cycles: u32,
}

impl QualityController {
    pub fn new(opts: AbrOptions, initial: QualityProfile) -> Self {
        Self {
            opts,
            profile: initial,
            target_bitrate_bps: initial.target_bitrate_bps() as f64,
            stable_cycles: 0,
        }
    }

    pub fn profile(&self) -> QualityProfile {
        self.profile
    }

    pub fn target_bitrate_bps(&self) -> u64 {
        self.target_bitrate_bps.round() as u64
    }

    /// Run one control cycle against a fresh bandwidth estimate.
    ///
    /// Quality transitions move one level per cycle; only the emergency
    /// path may jump straight to `Low`.
    pub fn on_estimate(&mut self, estimate: &BandwidthEstimate) -> QualityDecision {
        let utilization = if estimate.bps == 0 {
            f64::INFINITY
        } else {
            self.target_bitrate_bps / estimate.bps as f64
        };

        let action = if utilization >= self.opts.emergency_utilization {
            self.stable_cycles = 0;
            if self.profile.is_min() {
                QualityAction::Hold
            } else {
                self.profile = QualityProfile::Low;
                self.target_bitrate_bps = self.profile.target_bitrate_bps() as f64;
                QualityAction::EmergencyDegrade
            }
        } else if utilization >= self.opts.step_down_utilization {
            self.stable_cycles = 0;
            if self.profile.is_min() {
                QualityAction::Hold
            } else {
                self.profile = self.profile.step_down();
                self.target_bitrate_bps = self.profile.target_bitrate_bps() as f64;
                QualityAction::StepDown
            }
        } else if utilization >= self.opts.soft_reduce_utilization {
            self.stable_cycles = 0;
            self.target_bitrate_bps *= self.opts.soft_reduce_factor;
            QualityAction::SoftReduce
        } else if utilization < self.opts.step_up_utilization {
            if self.profile.is_max() {
                self.stable_cycles = 0;
                QualityAction::Hold
            } else {
                self.stable_cycles += 1;
                if self.stable_cycles >= self.opts.step_up_stable_cycles {
                    self.stable_cycles = 0;
                    self.profile = self.profile.step_up();
                    self.target_bitrate_bps = self.profile.target_bitrate_bps() as f64;
                    QualityAction::StepUp
                } else {
                    QualityAction::NotStableYet
                }
            }
        } else {
            self.stable_cycles = 0;
            QualityAction::Hold
        };

        tracing::debug!(
            utilization,
            estimate_bps = estimate.bps,
            profile = ?self.profile,
            target_bps = self.target_bitrate_bps as u64,
            ?action,
            "quality control cycle"
        );

        QualityDecision {
            profile: self.profile,
            target_bitrate_bps: self.target_bitrate_bps.round() as u64,
            action,
            utilization,
        }
    }

    /// Reset to an initial profile, e.g. after reconnection.
    pub fn reset(&mut self, profile: QualityProfile) {
        self.profile = profile;
        self.target_bitrate_bps = profile.target_bitrate_bps() as f64;
        self.stable_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use pulselink_core::FusionWeights;
    use rstest::rstest;

    use super::*;

    fn estimate(bps: u64) -> BandwidthEstimate {
        BandwidthEstimate {
            bps,
            confidence: 0.9,
            weights: FusionWeights::default(),
        }
    }

    fn controller(initial: QualityProfile) -> QualityController {
        QualityController::new(AbrOptions::default(), initial)
    }

    #[test]
    fn emergency_degrade_jumps_to_low_within_one_cycle() {
        // 1.2 Mbps current over 500 kbps estimated: utilization 2.4.
        let mut c = controller(QualityProfile::Medium);
        assert_eq!(c.target_bitrate_bps(), 1_500_000);

        let d = c.on_estimate(&estimate(500_000));
        assert_eq!(d.action, QualityAction::EmergencyDegrade);
        assert_eq!(d.profile, QualityProfile::Low);
        assert!(d.utilization > 2.0);
    }

    #[test]
    fn step_down_is_immediate_and_single_level() {
        // High = 3 Mbps target; estimate 2 Mbps gives utilization 1.5.
        let mut c = controller(QualityProfile::High);
        let d = c.on_estimate(&estimate(2_000_000));
        assert_eq!(d.action, QualityAction::StepDown);
        assert_eq!(d.profile, QualityProfile::Medium);
    }

    #[test]
    fn step_up_requires_two_stable_cycles() {
        // Medium = 1.5 Mbps target; estimate 10 Mbps gives utilization 0.15.
        let mut c = controller(QualityProfile::Medium);

        let d1 = c.on_estimate(&estimate(10_000_000));
        assert_eq!(d1.action, QualityAction::NotStableYet);
        assert_eq!(d1.profile, QualityProfile::Medium);

        let d2 = c.on_estimate(&estimate(10_000_000));
        assert_eq!(d2.action, QualityAction::StepUp);
        assert_eq!(d2.profile, QualityProfile::High);
    }

    #[test]
    fn soft_reduce_shaves_bitrate_without_level_change() {
        // Medium 1.5 Mbps over 1.6 Mbps: utilization ~0.94.
        let mut c = controller(QualityProfile::Medium);
        let d = c.on_estimate(&estimate(1_600_000));
        assert_eq!(d.action, QualityAction::SoftReduce);
        assert_eq!(d.profile, QualityProfile::Medium);
        assert_eq!(d.target_bitrate_bps, 1_200_000);
    }

    #[test]
    fn hold_band_changes_nothing() {
        // Medium 1.5 Mbps over 2.5 Mbps: utilization 0.6.
        let mut c = controller(QualityProfile::Medium);
        let d = c.on_estimate(&estimate(2_500_000));
        assert_eq!(d.action, QualityAction::Hold);
        assert_eq!(d.target_bitrate_bps, 1_500_000);
    }

    #[test]
    fn oscillation_does_not_flap() {
        // Estimates alternating around the step-up threshold: the stability
        // requirement keeps the profile from changing more than once per
        // two cycles.
        let mut c = controller(QualityProfile::Medium);
        let mut changes = 0;
        let mut last = c.profile();
        // utilization alternates ~0.47 / ~0.6
        for bps in [3_200_000u64, 2_500_000, 3_200_000, 2_500_000, 3_200_000, 2_500_000] {
            let d = c.on_estimate(&estimate(bps));
            if d.profile != last {
                changes += 1;
                last = d.profile;
            }
        }
        assert_eq!(changes, 0, "oscillating estimates must not flap quality");
    }

    #[test]
    fn hold_resets_stability_counter() {
        let mut c = controller(QualityProfile::Medium);
        assert_eq!(
            c.on_estimate(&estimate(10_000_000)).action,
            QualityAction::NotStableYet
        );
        // A hold cycle in between restarts the stability count.
        assert_eq!(
            c.on_estimate(&estimate(2_500_000)).action,
            QualityAction::Hold
        );
        assert_eq!(
            c.on_estimate(&estimate(10_000_000)).action,
            QualityAction::NotStableYet
        );
    }

    #[rstest]
    #[case(QualityProfile::Low)]
    #[case(QualityProfile::Ultra)]
    fn saturation_holds_at_ladder_ends(#[case] initial: QualityProfile) {
        let mut c = controller(initial);
        let d = if initial.is_min() {
            // Hopeless bandwidth while already at Low: hold, don't panic.
            c.on_estimate(&estimate(1_000))
        } else {
            // Plenty of bandwidth while already at Ultra.
            c.on_estimate(&estimate(1_000_000_000));
            c.on_estimate(&estimate(1_000_000_000))
        };
        assert_eq!(d.action, QualityAction::Hold);
        assert_eq!(d.profile, initial);
    }

    #[test]
    fn zero_estimate_treated_as_overload() {
        let mut c = controller(QualityProfile::Medium);
        let d = c.on_estimate(&estimate(0));
        assert_eq!(d.action, QualityAction::EmergencyDegrade);
        assert_eq!(d.profile, QualityProfile::Low);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut c = controller(QualityProfile::High);
        c.on_estimate(&estimate(100_000)); // emergency → Low
        c.reset(QualityProfile::Medium);
        assert_eq!(c.profile(), QualityProfile::Medium);
        assert_eq!(c.target_bitrate_bps(), 1_500_000);
    }
}
