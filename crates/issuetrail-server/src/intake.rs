use issuetrail_core::types::CapturedError;
use std::collections::BTreeSet;

/// Why a captured error was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Reporting is off in this environment.
    Disabled,
    /// Status code is not in the monitored set.
    Unmonitored,
}

/// Upstream selection of which captured errors are worth reporting.
#[derive(Debug, Clone)]
pub struct IntakeFilter {
    monitored: BTreeSet<u16>,
    enabled: bool,
}

impl IntakeFilter {
    pub fn new(monitored: BTreeSet<u16>, enabled: bool) -> Self {
        Self { monitored, enabled }
    }

    pub fn check(&self, error: &CapturedError) -> Result<(), Skip> {
        if !self.enabled {
            return Err(Skip::Disabled);
        }
        if !self.monitored.contains(&error.status_code) {
            return Err(Skip::Unmonitored);
        }
        Ok(())
    }

    pub fn monitored(&self) -> &BTreeSet<u16> {
        &self.monitored
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(status: u16) -> CapturedError {
        CapturedError::new("boom", "app.rs", 1, status)
    }

    #[test]
    fn test_monitored_status_admitted() {
        let filter = IntakeFilter::new(BTreeSet::from([500, 503]), true);
        assert_eq!(filter.check(&error(500)), Ok(()));
        assert_eq!(filter.check(&error(503)), Ok(()));
        assert_eq!(filter.check(&error(404)), Err(Skip::Unmonitored));
    }

    #[test]
    fn test_disabled_skips_everything() {
        let filter = IntakeFilter::new(BTreeSet::from([500]), false);
        assert_eq!(filter.check(&error(500)), Err(Skip::Disabled));
    }
}
