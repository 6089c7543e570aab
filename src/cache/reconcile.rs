//! Choosing between rebuilding and reusing the cached template.

use crate::server::InstanceState;

/// What `start` has to do before (or instead of) building the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPlan {
    /// No instance: wipe the directory, create and start it, rebuild.
    CleanStart,
    /// Instance exists but is stopped: delete it, then clean start.
    DeleteThenCleanStart,
    /// Instance is running but the template data file is gone: treat as
    /// corrupt, stop and delete it, then clean start.
    RecreateCorrupt,
    /// Instance is running with a template on disk. `rebuild` is false when the
    /// persisted marker matches the requested token.
    Reuse { rebuild: bool },
}

impl StartPlan {
    /// Whether the template files will be rebuilt.
    pub fn rebuilds(&self) -> bool {
        !matches!(self, StartPlan::Reuse { rebuild: false })
    }

    /// Whether the instance is (re)created from scratch.
    pub fn recreates_instance(&self) -> bool {
        !matches!(self, StartPlan::Reuse { .. })
    }
}

/// Evaluate the decision table, in order.
pub fn plan(
    state: InstanceState,
    data_file_exists: bool,
    marker: Option<&str>,
    uniqueness: &str,
) -> StartPlan {
    match state {
        InstanceState::Absent => StartPlan::CleanStart,
        InstanceState::Stopped => StartPlan::DeleteThenCleanStart,
        InstanceState::Running if !data_file_exists => StartPlan::RecreateCorrupt,
        InstanceState::Running => StartPlan::Reuse {
            rebuild: marker != Some(uniqueness),
        },
    }
}
