pub mod claim;

pub use claim::{ClaimOutcome, ClaimService, ClaimToken};
