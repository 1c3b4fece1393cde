//! Connection-scoped state mutated by the token dispatcher.

use crate::descriptor::{ComputeInfo, Dynamic, ParamInfo, ResultInfo};
use crate::error::ProtocolError;
use crate::version::TdsVersion;

/// Lifecycle of a session as driven by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No batch in flight.
    Idle,
    /// A batch has been sent and tokens are being read.
    Pending,
    /// The batch finished (`DONE`/`DONEPROC` with no more results).
    Completed,
    /// The transport failed or a fatal server error was reported; no
    /// further reads should be attempted.
    Dead,
}

/// Which descriptor the next `ROW`/`NBCROW` token should populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrResInfo {
    /// The regular result descriptor, `Session::res_info`.
    Regular,
    /// A compute descriptor, indexed into `Session::comp_info`.
    Compute(usize),
    /// The parameter descriptor, `Session::param_info`.
    Param,
}

/// All connection-scoped state the token dispatcher reads or mutates.
///
/// Replaces the original implementation's global/connection-struct fields
/// with plain owned data - there is exactly one `Session` per logical
/// connection and no implicit global state.
#[derive(Debug)]
pub struct Session {
    /// Negotiated protocol version.
    pub version: TdsVersion,
    /// Server process id, reported by `LOGINACK`/the legacy spid fallback.
    pub spid: u16,
    /// Server program name/version string, from `LOGINACK`.
    pub product_version: u32,
    /// Rows affected by the last DML statement (`DONE` row count with
    /// `DONE_COUNT` set).
    pub rows_affected: i32,
    /// Stored-procedure return status, from a `RETURNSTATUS` token.
    pub ret_status: Option<i32>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Active regular result descriptor, if a `COLMETADATA`/`RESULT` token
    /// has been seen for the current result set.
    pub res_info: Option<ResultInfo>,
    /// Active parameter descriptor, grown by `PARAM`/`PARAMFMT` tokens.
    pub param_info: Option<ParamInfo>,
    /// Active compute descriptors, one per `COMPUTE` clause.
    pub comp_info: Vec<ComputeInfo>,
    /// Which descriptor the next row token targets.
    pub curr_resinfo: CurrResInfo,
    /// Registered prepared statements, looked up by id.
    dynamics: Vec<Dynamic>,
    /// The dynamic statement currently being defined/executed, if any.
    pub curr_dyn: Option<usize>,
}

impl Session {
    /// Create a fresh session for a negotiated protocol version.
    #[must_use]
    pub fn new(version: TdsVersion) -> Self {
        Self {
            version,
            spid: 0,
            product_version: 0,
            rows_affected: 0,
            ret_status: None,
            state: SessionState::Idle,
            res_info: None,
            param_info: None,
            comp_info: Vec::new(),
            curr_resinfo: CurrResInfo::Regular,
            dynamics: Vec::new(),
            curr_dyn: None,
        }
    }

    /// Discard the current result/param/compute descriptors ahead of a new
    /// `COLMETADATA`/`RESULT` token. Ownership makes "free" implicit: the
    /// old descriptors are simply dropped.
    pub fn reset_result_descriptors(&mut self) {
        self.res_info = None;
        self.param_info = None;
        self.comp_info.clear();
        self.curr_resinfo = CurrResInfo::Regular;
    }

    /// Register a newly declared dynamic (prepared) statement, replacing
    /// any prior registration under the same id.
    pub fn register_dynamic(&mut self, dynamic: Dynamic) {
        if let Some(existing) = self.dynamics.iter_mut().find(|d| d.id == dynamic.id) {
            *existing = dynamic;
        } else {
            self.dynamics.push(dynamic);
        }
    }

    /// Look up a registered dynamic statement by id.
    #[must_use]
    pub fn lookup_dynamic(&self, id: &str) -> Option<&Dynamic> {
        self.dynamics.iter().find(|d| d.id == id)
    }

    /// Mutable lookup of a registered dynamic statement by id.
    pub fn lookup_dynamic_mut(&mut self, id: &str) -> Option<&mut Dynamic> {
        self.dynamics.iter_mut().find(|d| d.id == id)
    }

    /// Remove a dynamic statement from the registry (`DEALLOC`).
    pub fn drop_dynamic(&mut self, id: &str) -> Result<(), ProtocolError> {
        let before = self.dynamics.len();
        self.dynamics.retain(|d| d.id != id);
        if self.dynamics.len() == before {
            return Err(ProtocolError::UnknownDynamicId(id.to_string()));
        }
        Ok(())
    }

    /// Look up a compute descriptor by its `computeid`.
    #[must_use]
    pub fn find_compute(&self, computeid: i16) -> Option<&ComputeInfo> {
        self.comp_info.iter().find(|c| c.computeid == computeid)
    }

    /// Mark the session dead; no further reads should be attempted.
    pub fn mark_dead(&mut self) {
        self.state = SessionState::Dead;
    }

    /// `true` if this session's legacy login didn't report `rows_affected`
    /// and still needs the `select @@spid` fallback to learn its spid. Only
    /// meaningful immediately after `process_login_tokens` returns, before
    /// any batch has been run. See `DESIGN.md` for why this fallback
    /// exists only for pre-TDS 7.2 logins.
    #[must_use]
    pub fn needs_spid_fallback(&self) -> bool {
        self.spid == 0 && !self.version.is_tds_8() && self.version < TdsVersion::V7_2
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_registry_roundtrip() {
        let mut session = Session::new(TdsVersion::V7_4);
        session.register_dynamic(Dynamic {
            id: "stmt1".to_string(),
            num_id: 0,
            params: ParamInfo::default(),
        });
        assert!(session.lookup_dynamic("stmt1").is_some());
        session.drop_dynamic("stmt1").unwrap();
        assert!(session.lookup_dynamic("stmt1").is_none());
    }

    #[test]
    fn test_drop_unknown_dynamic_errors() {
        let mut session = Session::new(TdsVersion::V7_4);
        assert!(session.drop_dynamic("nope").is_err());
    }

    #[test]
    fn test_reset_result_descriptors_clears_everything() {
        let mut session = Session::new(TdsVersion::V7_4);
        session.res_info = Some(ResultInfo::default());
        session.curr_resinfo = CurrResInfo::Param;
        session.reset_result_descriptors();
        assert!(session.res_info.is_none());
        assert_eq!(session.curr_resinfo, CurrResInfo::Regular);
    }

    #[test]
    fn test_spid_fallback_only_for_legacy_versions() {
        let session = Session::new(TdsVersion::V7_4);
        assert!(!session.needs_spid_fallback());
        let mut legacy = Session::new(TdsVersion::V7_0);
        legacy.spid = 0;
        assert!(legacy.needs_spid_fallback());
        legacy.spid = 42;
        assert!(!legacy.needs_spid_fallback());
    }
}
