use crate::{
    config::PowerConfig,
    types::{PowerDecision, PowerSource, PowerState},
};

/// Threshold policy deciding whether the light may run.
///
/// Comparisons are inclusive and solar is checked first. There is no
/// hysteresis, so a reading sitting on a threshold can flap between cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerPolicy {
    pub solar_threshold_v: f32,
    pub battery_threshold_v: f32,
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self::from(&PowerConfig::default())
    }
}

impl From<&PowerConfig> for PowerPolicy {
    fn from(power: &PowerConfig) -> Self {
        Self {
            solar_threshold_v: power.solar_threshold_v,
            battery_threshold_v: power.battery_threshold_v,
        }
    }
}

impl PowerPolicy {
    pub fn decide(&self, solar_v: f32, battery_v: f32) -> PowerState {
        self.evaluate(solar_v, battery_v).state
    }

    pub fn evaluate(&self, solar_v: f32, battery_v: f32) -> PowerDecision {
        if solar_v >= self.solar_threshold_v {
            PowerDecision {
                state: PowerState::On,
                source: PowerSource::Solar,
            }
        } else if battery_v >= self.battery_threshold_v {
            PowerDecision {
                state: PowerState::On,
                source: PowerSource::Battery,
            }
        } else {
            PowerDecision {
                state: PowerState::Off,
                source: PowerSource::Insufficient,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn solar_threshold_is_inclusive() {
        assert_eq!(PowerPolicy::default().decide(5.0, 0.0), PowerState::On);
    }

    #[test]
    fn battery_covers_weak_solar() {
        let policy = PowerPolicy::default();
        assert_eq!(policy.decide(4.9, 3.6), PowerState::On);
        assert_eq!(policy.evaluate(4.9, 3.6).source, PowerSource::Battery);
    }

    #[test]
    fn off_when_both_insufficient() {
        let decision = PowerPolicy::default().evaluate(4.9, 3.5);
        assert_eq!(
            decision,
            PowerDecision {
                state: PowerState::Off,
                source: PowerSource::Insufficient,
            }
        );
    }

    #[test]
    fn solar_has_priority_when_both_sufficient() {
        let decision = PowerPolicy::default().evaluate(5.0, 3.6);
        assert_eq!(decision.state, PowerState::On);
        assert_eq!(decision.source, PowerSource::Solar);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let policy = PowerPolicy::default();
        for (solar, battery) in [(6.0, 3.0), (0.0, 2.0), (4.99, 3.59), (5.0, 3.6)] {
            let first = policy.evaluate(solar, battery);
            for _ in 0..10 {
                assert_eq!(policy.evaluate(solar, battery), first);
            }
        }
    }

    #[test]
    fn thresholds_follow_config() {
        let power = PowerConfig {
            solar_threshold_v: 2.0,
            battery_threshold_v: 1.0,
            ..PowerConfig::default()
        };
        let policy = PowerPolicy::from(&power);
        assert_eq!(policy.decide(2.0, 0.0), PowerState::On);
        assert_eq!(policy.decide(1.9, 0.9), PowerState::Off);
    }
}
