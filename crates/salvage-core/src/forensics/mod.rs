/// Integrity checks for recovered output
pub mod verification;

pub use verification::{
    calculate_file_hash, calculate_hash, verify_file_integrity, FileHash, HashManifest,
    HashVerification, VerificationStatus, VerificationSummary,
};
