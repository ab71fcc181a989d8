/// Knobs for the verifier
#[derive(Debug, Clone, Default)]
pub struct VerifierSettings {
    /// Log every abstract state as it is processed (at `info` level)
    ///
    /// Locals are written `V<i>` and stack slots `S<i>`, so the whole run can be followed
    /// instruction by instruction.
    pub trace_states: bool,
}
