//! Execution configuration.

/// How the emulator reacts to an out-of-bounds memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryMode {
    /// Print a diagnostic and keep running: reads return `0`, writes are
    /// dropped.
    #[default]
    Compliant,
    /// Dump the machine state and abort immediately.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMemoryModeError(String);

impl std::fmt::Display for ParseMemoryModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown memory mode {:?}, expected \"compliant\" or \"strict\"", self.0)
    }
}

impl std::error::Error for ParseMemoryModeError {}

impl std::str::FromStr for MemoryMode {
    type Err = ParseMemoryModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compliant" => Ok(MemoryMode::Compliant),
            "strict" => Ok(MemoryMode::Strict),
            _ => Err(ParseMemoryModeError(s.to_string())),
        }
    }
}
