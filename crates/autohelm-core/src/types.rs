use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of jobs the worker can run.
///
/// Dispatch goes through the registry built at startup; there is no dynamic
/// name-to-callable resolution. Adding a job means adding a variant here and
/// wiring it in the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    /// Recovery job: relaunch the controlled app and navigate back to a
    /// known screen. Force-scheduled by fault handling.
    Restart,
    /// The long-running primary job, preferred whenever resources allow.
    Leveling,
    Salvage,
    Convoy,
    Bounty,
    Forage,
}

impl JobId {
    /// All jobs, in tie-breaking priority order (recovery first).
    pub const ALL: [JobId; 6] = [
        JobId::Restart,
        JobId::Leveling,
        JobId::Salvage,
        JobId::Convoy,
        JobId::Bounty,
        JobId::Forage,
    ];

    /// Substitute jobs in their fixed hand-off priority order. The same
    /// order is used when enabling the set and when scanning for the next
    /// substitute after a no-work signal.
    pub const SUBSTITUTES: [JobId; 4] =
        [JobId::Salvage, JobId::Convoy, JobId::Bounty, JobId::Forage];

    pub fn role(self) -> JobRole {
        match self {
            JobId::Restart => JobRole::Recovery,
            JobId::Leveling => JobRole::Primary,
            JobId::Salvage | JobId::Convoy | JobId::Bounty | JobId::Forage => JobRole::Substitute,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobId::Restart => "restart",
            JobId::Leveling => "leveling",
            JobId::Salvage => "salvage",
            JobId::Convoy => "convoy",
            JobId::Bounty => "bounty",
            JobId::Forage => "forage",
        }
    }

    /// Position in [`JobId::ALL`], used to break `next_run` ties.
    pub fn priority(self) -> usize {
        Self::ALL.iter().position(|j| *j == self).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(JobId::Restart),
            "leveling" => Ok(JobId::Leveling),
            "salvage" => Ok(JobId::Salvage),
            "convoy" => Ok(JobId::Convoy),
            "bounty" => Ok(JobId::Bounty),
            "forage" => Ok(JobId::Forage),
            other => Err(format!("unknown job id: {other}")),
        }
    }
}

/// What a job is for, from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRole {
    Recovery,
    Primary,
    Substitute,
}

/// One registry entry. Built from config at startup, mutated by the
/// scheduler loop and the arbiter for the lifetime of the process, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
    pub role: JobRole,
}

impl Job {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run <= now
    }
}

/// The two shared resource gauges the arbiter reads fresh per checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gauge {
    /// Regenerated by substitute jobs, consumed by the primary.
    Currency,
    /// Consumed by every job, replenishes slowly on its own.
    Stamina,
}

impl Gauge {
    pub fn as_str(self) -> &'static str {
        match self {
            Gauge::Currency => "currency",
            Gauge::Stamina => "stamina",
        }
    }
}

impl fmt::Display for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graceful completion signal from a job body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to its natural end.
    Done,
    /// A substitute found nothing left to do. Feeds the arbiter's
    /// fallback scan; harmless for any other role.
    NoWork,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_are_a_subset_of_all() {
        for sub in JobId::SUBSTITUTES {
            assert!(JobId::ALL.contains(&sub));
            assert_eq!(sub.role(), JobRole::Substitute);
        }
    }

    #[test]
    fn restart_has_highest_priority() {
        assert_eq!(JobId::Restart.priority(), 0);
        assert!(JobId::Restart.priority() < JobId::Leveling.priority());
    }

    #[test]
    fn job_id_round_trips_through_str() {
        for id in JobId::ALL {
            assert_eq!(id.as_str().parse::<JobId>().unwrap(), id);
        }
        assert!("reward".parse::<JobId>().is_err());
    }
}
