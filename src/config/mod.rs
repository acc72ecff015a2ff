//! Grammar compilation configuration. Deliberately thin — this is a
//! library, not an application with a config file format, so no
//! serde/toml dependency is pulled in for it (SPEC_FULL.md §7).

#[derive(Debug, Clone)]
pub struct GrammarConfig {
    /// Name attached to the compiled grammar, used only in log output.
    pub name: String,
    /// Enables `log::trace!` output for rule application and
    /// ordered-choice attempts.
    pub trace: bool,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig { name: "grammar".to_string(), trace: false }
    }
}
