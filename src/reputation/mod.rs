mod checker;
mod error;
mod verdict;
mod virustotal;

pub use checker::{parse_check_url, ReputationChecker, ReputationSource};
pub use error::CheckError;
pub use verdict::{Verdict, VerdictKind};
pub use virustotal::VirusTotalSource;
