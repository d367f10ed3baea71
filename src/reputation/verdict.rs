use serde::{Deserialize, Serialize};

/// Outcome of a single reputation check.
///
/// At most one of the two flags is ever set: malicious takes precedence over
/// suspicious, and both clear means the domain is considered safe. The fields
/// are private so every constructor goes through that normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    malicious: bool,
    suspicious: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Safe,
    Suspicious,
    Malicious,
}

impl Verdict {
    pub const SAFE: Verdict = Verdict {
        malicious: false,
        suspicious: false,
    };

    pub fn new(malicious: bool, suspicious: bool) -> Self {
        Verdict {
            malicious,
            suspicious: suspicious && !malicious,
        }
    }

    /// Folds per-engine detection counts into a verdict
    pub fn from_counts(malicious: u64, suspicious: u64) -> Self {
        Self::new(malicious > 0, suspicious > 0)
    }

    pub fn malicious(&self) -> bool {
        self.malicious
    }

    pub fn suspicious(&self) -> bool {
        self.suspicious
    }

    pub fn kind(&self) -> VerdictKind {
        if self.malicious {
            VerdictKind::Malicious
        } else if self.suspicious {
            VerdictKind::Suspicious
        } else {
            VerdictKind::Safe
        }
    }
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Safe => "safe",
            VerdictKind::Suspicious => "suspicious",
            VerdictKind::Malicious => "malicious",
        }
    }
}
