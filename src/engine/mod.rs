//! Pure computation for battle outcomes.

pub mod payout;

pub use payout::{plan_payout, PayoutError, PayoutPlan};
