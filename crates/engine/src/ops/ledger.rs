use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, Condition, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, EntryId, Money, NewEntry, PassbookEntry, ResultEngine, eligibility_cap, passbook,
};

use super::{Engine, with_tx};

/// Loan-sizing guideline derived from a member's deposits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub total_deposits: i64,
    /// 80 % of `total_deposits`.
    pub cap: i64,
}

/// Filters for listing a member's passbook.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both matched
/// against the transaction date. `after` resumes a previous page after the
/// given entry; `limit` caps the page size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassbookFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub after: Option<EntryId>,
    pub limit: Option<u64>,
}

impl PassbookFilter {
    fn validate(&self) -> ResultEngine<()> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from >= to
        {
            return Err(EngineError::Validation(
                "invalid range: from must be < to".to_string(),
            ));
        }
        if self.limit == Some(0) {
            return Err(EngineError::Validation("limit must be > 0".to_string()));
        }
        Ok(())
    }
}

/// One page of passbook entries, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassbookPage {
    pub entries: Vec<PassbookEntry>,
    /// Pass as `after` to fetch the next page. `None` on the last page.
    pub next_after: Option<EntryId>,
}

impl Engine {
    /// Appends one immutable passbook entry.
    ///
    /// The entry is validated against its mode (see [`NewEntry::validate`]);
    /// a referenced loan must exist and belong to the same member. The row is
    /// visible to every reader once this returns.
    pub async fn append_entry(&self, entry: NewEntry) -> ResultEngine<EntryId> {
        let id = with_tx!(self, |db_tx| self.insert_entry(&db_tx, &entry).await)?;
        tracing::debug!(
            entry_id = id,
            member_id = %entry.member_id,
            mode = entry.mode.as_str(),
            "passbook entry appended"
        );
        Ok(id)
    }

    pub(super) async fn insert_entry<C: ConnectionTrait>(
        &self,
        db: &C,
        entry: &NewEntry,
    ) -> ResultEngine<EntryId> {
        entry.validate()?;
        self.require_member(db, entry.member_id).await?;
        if let Some(loan_id) = entry.loan_id {
            let loan = self.require_loan(db, loan_id).await?;
            if loan.member_id != entry.member_id.to_string() {
                return Err(EngineError::NotFound("loan not exists".to_string()));
            }
        }

        let model = passbook::ActiveModel::from_new(entry, Utc::now())
            .insert(db)
            .await?;
        Ok(model.id)
    }

    /// Sum of all deposits of a member. Zero when there are none.
    pub async fn total_deposits(&self, member_id: Uuid) -> ResultEngine<i64> {
        self.require_member(&self.database, member_id).await?;
        self.sum_deposits(&self.database, member_id).await
    }

    /// Total deposits together with the 80 % loan eligibility cap.
    pub async fn eligibility(&self, member_id: Uuid) -> ResultEngine<Eligibility> {
        let total_deposits = self.total_deposits(member_id).await?;
        Ok(Eligibility {
            total_deposits,
            cap: eligibility_cap(total_deposits),
        })
    }

    /// Sum of installments paid by `member_id` towards `loan_id`.
    pub async fn total_installments_paid(
        &self,
        member_id: Uuid,
        loan_id: Uuid,
    ) -> ResultEngine<i64> {
        self.sum_installments(&self.database, member_id, loan_id)
            .await
    }

    /// Every passbook entry of a member, oldest first.
    pub async fn passbook(&self, member_id: Uuid) -> ResultEngine<Vec<PassbookEntry>> {
        let page = self
            .passbook_page(member_id, &PassbookFilter::default())
            .await?;
        Ok(page.entries)
    }

    /// Passbook entries of a member within a date range, with keyset
    /// pagination.
    ///
    /// Pages walk `(transaction_date, id)` ascending, so entries posted
    /// between two calls never shift an earlier page.
    pub async fn passbook_page(
        &self,
        member_id: Uuid,
        filter: &PassbookFilter,
    ) -> ResultEngine<PassbookPage> {
        filter.validate()?;
        with_tx!(self, |db_tx| {
            self.require_member(&db_tx, member_id).await?;

            let mut query = passbook::Entity::find()
                .filter(passbook::Column::MemberId.eq(member_id.to_string()))
                .order_by_asc(passbook::Column::TransactionDate)
                .order_by_asc(passbook::Column::Id);
            if let Some(from) = filter.from {
                query = query.filter(passbook::Column::TransactionDate.gte(from));
            }
            if let Some(to) = filter.to {
                query = query.filter(passbook::Column::TransactionDate.lt(to));
            }
            if let Some(after) = filter.after {
                let anchor = passbook::Entity::find_by_id(after)
                    .filter(passbook::Column::MemberId.eq(member_id.to_string()))
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("passbook entry {after}")))?;
                query = query.filter(
                    Condition::any()
                        .add(passbook::Column::TransactionDate.gt(anchor.transaction_date))
                        .add(
                            Condition::all()
                                .add(passbook::Column::TransactionDate.eq(anchor.transaction_date))
                                .add(passbook::Column::Id.gt(anchor.id)),
                        ),
                );
            }
            if let Some(limit) = filter.limit {
                query = query.limit(limit.saturating_add(1));
            }

            let mut entries = query
                .all(&db_tx)
                .await?
                .into_iter()
                .map(PassbookEntry::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            let has_more = filter
                .limit
                .is_some_and(|limit| entries.len() as u64 > limit);
            if let Some(limit) = filter.limit {
                entries.truncate(limit as usize);
            }
            let next_after = if has_more {
                entries.last().map(|entry| entry.id)
            } else {
                None
            };
            Ok(PassbookPage {
                entries,
                next_after,
            })
        })
    }

    pub(super) async fn sum_deposits<C: ConnectionTrait>(
        &self,
        db: &C,
        member_id: Uuid,
    ) -> ResultEngine<i64> {
        let amounts: Vec<i64> = passbook::Entity::find()
            .select_only()
            .column(passbook::Column::DepositAmount)
            .filter(passbook::Column::MemberId.eq(member_id.to_string()))
            .order_by_asc(passbook::Column::TransactionDate)
            .order_by_asc(passbook::Column::Id)
            .into_tuple()
            .all(db)
            .await?;
        checked_total(amounts, "deposits")
    }

    pub(super) async fn sum_installments<C: ConnectionTrait>(
        &self,
        db: &C,
        member_id: Uuid,
        loan_id: Uuid,
    ) -> ResultEngine<i64> {
        let amounts: Vec<i64> = passbook::Entity::find()
            .select_only()
            .column(passbook::Column::LoanInstallment)
            .filter(passbook::Column::MemberId.eq(member_id.to_string()))
            .filter(passbook::Column::LoanId.eq(loan_id.to_string()))
            .filter(passbook::Column::LoanInstallment.gt(0))
            .order_by_asc(passbook::Column::TransactionDate)
            .order_by_asc(passbook::Column::Id)
            .into_tuple()
            .all(db)
            .await?;
        checked_total(amounts, "installments")
    }
}

fn checked_total(amounts: Vec<i64>, label: &str) -> ResultEngine<i64> {
    amounts
        .into_iter()
        .try_fold(Money::ZERO, |acc, amount| acc.checked_add(Money::new(amount)))
        .map(Money::minor)
        .ok_or_else(|| EngineError::IntegrityViolation(format!("{label} total overflows")))
}
