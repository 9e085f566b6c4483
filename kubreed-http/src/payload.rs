//! Categorized query payloads mixed into outgoing requests.
//!
//! Out of every 100 pause intervals, the first `pii_percent` attach a PII
//! payload, the next `attack_percent` an attack pattern and the next
//! `user_percent` a benign user payload. The remaining intervals send bare
//! requests.

use kubreed_core::WorkloadConfig;

/// Length of the payload cycle.
pub const CYCLE: usize = 100;

/// Query strings carrying personally identifiable information.
pub const PII: [&str; 5] = [
    "cc=5555555555554444",
    "ssn=234-90-2232",
    "PassportID=100003106",
    "itins=912-79-1234",
    "bankroutingnumber=133563585",
];

/// Query strings resembling common attacks.
pub const ATTACK: [&str; 5] = [
    "d=${jndi:ldap://127.0.0.1/a}",
    "id=Holly%22%20UNION%20SELECT%20database(),2,3,4,5,6,7%20--+",
    "1;phpinfo()",
    "/../../../../etc/passwd",
    ">/><body/onload=alert()>",
];

/// Query strings of ordinary user traffic.
pub const USER: [&str; 5] = [
    "username=test1",
    "user=test2",
    "username=kube1",
    "user=kube2",
    "username=test3",
];

/// The share of each payload category within one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrafficMix {
    /// Positions carrying [`PII`] payloads.
    pub pii: usize,
    /// Positions carrying [`ATTACK`] payloads.
    pub attack: usize,
    /// Positions carrying [`USER`] payloads.
    pub user: usize,
}

impl TrafficMix {
    /// Takes the percentages of a workload configuration.
    pub fn from_config(config: &WorkloadConfig) -> Self {
        Self {
            pii: config.pii_percent,
            attack: config.attack_percent,
            user: config.user_percent,
        }
    }

    /// Selects the payload for a cycle position, or `None` for a bare request.
    pub fn payload(&self, position: usize) -> Option<&'static str> {
        let attack_start = self.pii;
        let user_start = attack_start.saturating_add(self.attack);
        let end = user_start.saturating_add(self.user);

        let (set, offset) = match position {
            p if p < attack_start => (&PII, p),
            p if p < user_start => (&ATTACK, p - attack_start),
            p if p < end => (&USER, p - user_start),
            _ => return None,
        };
        Some(set[offset % set.len()])
    }
}
