use std::collections::BTreeMap;

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    IntegrityReport, IntegrityWarning, Loan, LoanStatus, ResultEngine, loans, maturity, passbook,
    util::parse_uuid,
};

use super::{Engine, with_tx};

impl Engine {
    /// Scans the whole store for states the engine itself never produces.
    ///
    /// Nothing is repaired; every finding is logged and returned so an
    /// operator can decide what to do with it.
    pub async fn integrity_check(&self) -> ResultEngine<IntegrityReport> {
        let report = with_tx!(self, |db_tx| {
            let mut findings = Vec::new();

            let active = loans::Entity::find()
                .filter(loans::Column::Status.eq(LoanStatus::Active.as_str()))
                .order_by_asc(loans::Column::MemberId)
                .order_by_desc(loans::Column::CreatedAt)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Loan::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            let mut by_member: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
            for loan in &active {
                by_member.entry(loan.member_id).or_default().push(loan.id);
            }
            for (member_id, loan_ids) in by_member {
                if loan_ids.len() > 1 {
                    findings.push(IntegrityWarning::MultipleActiveLoans { member_id, loan_ids });
                }
            }

            for loan in &active {
                if self.outstanding(&db_tx, loan).await? == 0 {
                    findings.push(IntegrityWarning::RepaidLoanStillActive { loan_id: loan.id });
                }
            }

            let undisbursed: Vec<(i64, String)> = passbook::Entity::find()
                .select_only()
                .column(passbook::Column::Id)
                .column(passbook::Column::LoanId)
                .inner_join(loans::Entity)
                .filter(passbook::Column::LoanInstallment.gt(0))
                .filter(loans::Column::Status.is_in([
                    LoanStatus::Pending.as_str(),
                    LoanStatus::Rejected.as_str(),
                ]))
                .order_by_asc(passbook::Column::Id)
                .into_tuple()
                .all(&db_tx)
                .await?;
            for (entry_id, loan_id) in undisbursed {
                findings.push(IntegrityWarning::InstallmentOnUndisbursedLoan {
                    entry_id,
                    loan_id: parse_uuid(&loan_id, "loan")?,
                });
            }

            let mismatched: Vec<String> = maturity::Entity::find()
                .select_only()
                .column(maturity::Column::Id)
                .filter(
                    Condition::any()
                        .add(
                            maturity::Column::ManualOverride
                                .eq(true)
                                .and(maturity::Column::AdjustedInterest.is_null()),
                        )
                        .add(
                            maturity::Column::ManualOverride
                                .eq(false)
                                .and(maturity::Column::AdjustedInterest.is_not_null()),
                        ),
                )
                .order_by_asc(maturity::Column::CreatedAt)
                .into_tuple()
                .all(&db_tx)
                .await?;
            for record_id in mismatched {
                findings.push(IntegrityWarning::OverrideMismatch {
                    record_id: parse_uuid(&record_id, "maturity record")?,
                });
            }

            Ok(IntegrityReport { findings })
        })?;

        for finding in &report.findings {
            tracing::error!(finding = ?finding, "integrity violation");
        }
        tracing::info!(findings = report.findings.len(), "integrity check finished");
        Ok(report)
    }
}
