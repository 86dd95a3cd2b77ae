use std::time::Duration;

/// What to do when the device rejects one of the identity strings.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StringPolicy {
    /// Log the failure and carry on. Some devices stall on strings they don't care about but
    /// still switch modes after START.
    #[default]
    BestEffort,
    /// Give up on the first failed string.
    AbortOnFailure,
}

/// Tunables for connecting to an accessory. [Default] gives the timings used by most AOA hosts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Pause between claiming the candidate device and sending it strings.
    pub settle_delay: Duration,
    /// Pause after START for the device to come back in accessory mode.
    pub reenumeration_delay: Duration,
    /// Timeout for handshake control transfers. Zero waits forever.
    pub control_timeout: Duration,
    pub string_policy: StringPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1),
            reenumeration_delay: Duration::from_secs(3),
            control_timeout: Duration::ZERO,
            string_policy: StringPolicy::BestEffort,
        }
    }
}

impl BridgeConfig {
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn reenumeration_delay(mut self, delay: Duration) -> Self {
        self.reenumeration_delay = delay;
        self
    }

    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn string_policy(mut self, policy: StringPolicy) -> Self {
        self.string_policy = policy;
        self
    }
}
