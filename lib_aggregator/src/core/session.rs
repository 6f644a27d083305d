use serde::{Deserialize, Serialize};

/// Values the session-scoped tables are filtered on.
///
/// The session id itself is not kept here: it arrives with the level-zero
/// dynamic table and lives on the graph root, so it is always the value of the
/// current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Substring the `FMURL` column of level-zero rows must contain.
    pub l0_filter: String,
    /// Service name of the TCDS partition manager serving this run.
    pub tcds_pm_service: Option<String>,
    /// URL of the TCDS partition manager serving this run.
    pub tcds_pm_context: Option<String>,
}

impl SessionContext {
    pub fn new(l0_filter: impl Into<String>) -> Self {
        Self { l0_filter: l0_filter.into(), ..Self::default() }
    }

    /// Sets the TCDS partition manager the TCDS tables are read from.
    pub fn with_tcds(mut self, service: impl Into<String>, context: impl Into<String>) -> Self {
        self.tcds_pm_service = Some(service.into());
        self.tcds_pm_context = Some(context.into());
        self
    }

    /// The TCDS service and URL when both are known.
    pub fn tcds(&self) -> Option<(&str, &str)> {
        Some((self.tcds_pm_service.as_deref()?, self.tcds_pm_context.as_deref()?))
    }

    /// Whether an `FMURL` value belongs to the configured level-zero instance.
    pub fn accepts_fm_url(&self, fm_url: &str) -> bool {
        fm_url.contains(&self.l0_filter)
    }
}
