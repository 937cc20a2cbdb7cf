//! Shared data types for the unsubscribe agent.
//!
//! Kept dependency-light (serde only) so the HTML utilities, the agent core
//! and the CLI can all depend on it.

#![warn(missing_docs)]

pub mod email;
pub mod plan;
pub mod snapshot;
pub mod verdict;

pub use email::{
    validate_category_color, validate_category_description, validate_category_name,
    CategoryDefinition, CategoryError, EmailRecord, SyncOptions, SyncResult,
};
pub use plan::{
    ActionPlan, FieldKind, FieldToFill, NextAction, PageIntent, EMAIL_PLACEHOLDER,
    GENERIC_EMAIL_SELECTOR,
};
pub use snapshot::{ElementDescriptor, FormDescriptor, PageSnapshot};
pub use verdict::{Artifact, OutcomeStatus, OutcomeVerdict, UnsubscribeOutcome, UnsubscribeTarget};
