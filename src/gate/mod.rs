//! Gates applied before stages execute

pub mod confirm;
pub mod privilege;

pub use confirm::{ArtifactChange, ConfirmationGate, Prompter, Summary, SummaryEntry};
pub use privilege::{effective_uid, PrivilegeGate};
