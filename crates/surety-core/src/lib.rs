//! Surety core: a custodial ledger that issues, activates, prices, and pays
//! out bounded monetary coverage against pooled deposited funds.
//!
//! Two disjoint externally-controlled roles drive the lifecycle: an Issuer
//! originates and prices coverage, and a ClaimsAuthority triggers payouts.
//! The crate enforces the policy state machine, the pooled-exposure pricing
//! formula, the authorization boundary, and the checks-effects-interactions
//! payout protocol with append-only audit events.

#![deny(unsafe_code)]

pub mod authorization;
pub mod clock;
pub mod custody;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod pricing;
pub mod storage;
pub mod types;

pub use authorization::{AuthorizationGate, Role, RolesConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use custody::{FundCustody, PayoutChannel, PayoutReceipt};
pub use engine::{EngineConfig, SuretyEngine};
pub use error::SuretyError;
pub use events::{EventKind, EventLog, EventRecord, PolicyEvent, ReimbursedEvent};
pub use ledger::{ActivationEffects, PolicyLedger};
pub use pricing::PremiumModel;
pub use storage::{EventStorageConfig, PersistentEventLog};
pub use types::{
    ActivationOutcome, CreatePolicyRequest, Policy, PolicyId, ReimbursementOutcome,
};
