use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One import run. Finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub imported: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunStats {
    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    pub fn counters(&self) -> ImportCounters {
        ImportCounters {
            imported: self.imported,
            skipped: self.skipped,
            errors: self.errors,
        }
    }
}

/// Mutually exclusive per-item tallies of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounters {
    pub imported: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl ImportCounters {
    pub fn total(&self) -> u64 {
        self.imported + self.skipped + self.errors
    }
}

impl std::fmt::Display for ImportCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported: {}, Skipped: {}, Errors: {}",
            self.imported, self.skipped, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_is_completion_minus_start() {
        let started_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut run = RunStats {
            id: 1,
            started_at,
            completed_at: None,
            imported: 0,
            skipped: 0,
            errors: 0,
        };
        assert_eq!(run.duration(), None);

        run.completed_at = Some(started_at + chrono::Duration::seconds(42));
        assert_eq!(run.duration(), Some(chrono::Duration::seconds(42)));
        assert!(run.is_finished());
    }
}
