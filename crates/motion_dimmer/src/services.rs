use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::port::DimmerPort;
use crate::port::ServicePort;
use crate::MotionDimmer;

/// How long to suspend automation for. All zero means the configured
/// manual override period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableRequest {
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
}

impl DisableRequest {
    pub fn total_seconds(&self) -> u64 {
        self.hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds)
    }
}

impl<P: DimmerPort> MotionDimmer<P> {
    /// Suspend automation. Returns false if nothing changed because an
    /// existing disable already lasts longer.
    pub fn temporarily_disable(&mut self, request: DisableRequest) -> bool {
        let seconds = match request.total_seconds() {
            0 => self.port().manual_override().unwrap_or(0),
            seconds => seconds,
        };
        if seconds == 0 {
            return false;
        }
        self.extend_disable(seconds)
    }

    /// End the countdown now.
    pub fn finish_timer(&mut self) {
        info!("Finishing countdown");
        self.port_mut().cancel_timer();
        self.port_mut().cancel_periodic_timer();
        self.stop_dimmer();
    }
}

impl<P: ServicePort> MotionDimmer<P> {
    /// Clear any temporary disable and switch automation back on.
    pub fn enable(&mut self) {
        info!("Enabling");
        let now = self.port().now();
        self.port_mut().set_temporarily_disabled(now);
        self.port_mut().set_automation_enabled(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Call;
    use crate::mock::MockPort;

    #[test]
    fn test_total_seconds() {
        let request = DisableRequest {
            hours: 1,
            minutes: 2,
            seconds: 3,
        };
        assert_eq!(request.total_seconds(), 3723);
        assert_eq!(DisableRequest::default().total_seconds(), 0);

        let huge = DisableRequest {
            hours: u64::MAX,
            ..Default::default()
        };
        assert_eq!(huge.total_seconds(), u64::MAX);
    }

    #[test]
    fn test_temporarily_disable_explicit_duration() {
        let mut dimmer = MotionDimmer::new(MockPort::default());
        let request = DisableRequest {
            minutes: 30,
            ..Default::default()
        };
        assert!(dimmer.temporarily_disable(request));
        assert_eq!(dimmer.port().disabled_in(), 1800);
        insta::assert_snapshot!(dimmer.port_mut().take_log(), @r"
        schedule_timer in=1805s duration=0:30:05
        set_temporarily_disabled in=1800s
        ");
        assert!(!dimmer.is_enabled());
    }

    #[test]
    fn test_temporarily_disable_defaults_to_manual_override() {
        let mut dimmer = MotionDimmer::new(MockPort::default());
        assert!(dimmer.temporarily_disable(DisableRequest::default()));
        assert_eq!(dimmer.port().disabled_in(), 600);
    }

    #[test]
    fn test_temporarily_disable_never_shortens() {
        let mut dimmer = MotionDimmer::new(MockPort::default());
        let long = DisableRequest {
            hours: 2,
            ..Default::default()
        };
        assert!(dimmer.temporarily_disable(long));
        dimmer.port_mut().take_log();

        let short = DisableRequest {
            seconds: 10,
            ..Default::default()
        };
        assert!(!dimmer.temporarily_disable(short));
        assert_eq!(dimmer.port().disabled_in(), 7200);
        assert!(dimmer.port().calls().is_empty());
    }

    #[test]
    fn test_enable_clears_disable() {
        let mut port = MockPort::default();
        port.automation_on = false;
        let mut dimmer = MotionDimmer::new(port);
        dimmer.temporarily_disable(DisableRequest {
            hours: 1,
            ..Default::default()
        });
        dimmer.port_mut().take_log();

        dimmer.enable();
        assert_eq!(dimmer.port().disabled_in(), 0);
        assert!(dimmer.port().automation_on);
        assert!(dimmer.is_enabled());
        assert_eq!(
            dimmer.port().calls(),
            &[
                Call::SetTemporarilyDisabled { secs: 0 },
                Call::SetAutomationEnabled(true),
            ]
        );
    }

    #[test]
    fn test_finish_timer_turns_off() {
        let mut dimmer = MotionDimmer::new(MockPort::default());
        dimmer.port_mut().triggers_on = true;
        dimmer.triggered_callback();
        dimmer.port_mut().triggers_on = false;
        dimmer.port_mut().take_log();

        dimmer.finish_timer();
        assert!(!dimmer.port().dimmer_on);
        assert_eq!(
            dimmer.port().names(),
            [
                "cancel_timer",
                "cancel_periodic_timer",
                "cancel_timer",
                "cancel_periodic_timer",
                "turn_off_dimmer",
                "track_timer",
            ]
        );
    }
}
