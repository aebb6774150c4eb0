//! Integrity findings.
//!
//! The engine never repairs data on its own. Problems noticed while serving a
//! read are attached to the result as warnings; a full scan is available to
//! operators through [`Engine::integrity_check`](crate::Engine::integrity_check).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EntryId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// More than one `active` loan for the same member (newest first).
    MultipleActiveLoans { member_id: Uuid, loan_ids: Vec<Uuid> },
    /// An `active` loan whose derived outstanding balance is already zero.
    RepaidLoanStillActive { loan_id: Uuid },
    /// `manual_override` and `adjusted_interest` disagree.
    OverrideMismatch { record_id: Uuid },
    /// Installment posted against a loan that was never disbursed.
    InstallmentOnUndisbursedLoan { entry_id: EntryId, loan_id: Uuid },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub findings: Vec<IntegrityWarning>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}
