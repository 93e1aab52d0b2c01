//! Per-type capability flags.

use std::fmt;

/// An operation a credential type may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Mount,
    Env,
    Rotate,
    Import,
    Verify,
}

impl Capability {
    /// All capabilities, in display order.
    pub const ALL: [Capability; 5] = [
        Capability::Mount,
        Capability::Env,
        Capability::Rotate,
        Capability::Import,
        Capability::Verify,
    ];

    /// Verb used in skip messages ("cannot be <verb>").
    pub fn past_participle(self) -> &'static str {
        match self {
            Capability::Mount => "mounted",
            Capability::Env => "exported",
            Capability::Rotate => "rotated",
            Capability::Import => "imported",
            Capability::Verify => "verified",
        }
    }

    fn summary(self) -> &'static str {
        match self {
            Capability::Mount => "Allows to mount a standard credentials file",
            Capability::Env => "Allows to print credentials as environment variables",
            Capability::Rotate => "Allows to rotate credentials",
            Capability::Import => "Allows to import credentials from a file",
            Capability::Verify => "Allows to verify credentials",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Mount => "mount",
            Capability::Env => "env",
            Capability::Rotate => "rotate",
            Capability::Import => "import",
            Capability::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Fixed set of operations a credential type declares valid for itself.
///
/// Declared once per variant as a constant; never changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityDescriptor {
    pub mount: bool,
    pub env: bool,
    pub rotate: bool,
    pub import: bool,
    pub verify: bool,
}

impl CapabilityDescriptor {
    /// Whether the descriptor grants `capability`.
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Mount => self.mount,
            Capability::Env => self.env,
            Capability::Rotate => self.rotate,
            Capability::Import => self.import,
            Capability::Verify => self.verify,
        }
    }
}

/// One tab-indented line per capability, marked `✔` or `✘`.
impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, capability) in Capability::ALL.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let mark = if self.allows(*capability) { '✔' } else { '✘' };
            write!(f, "\t{}\t{}", mark, capability.summary())?;
        }
        Ok(())
    }
}
