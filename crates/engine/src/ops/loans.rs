use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    ApprovalTerms, EngineError, InstallmentReceipt, IntegrityWarning, Loan, LoanBalance,
    LoanStatus, Money, NewEntry, Notification, ResultEngine, eligibility_cap, loans,
    util::normalize_optional_text,
};

use super::{Engine, with_tx};

impl Engine {
    /// Files a new loan request in `pending` state.
    pub async fn request_loan(
        &self,
        member_id: Uuid,
        amount: i64,
        interest_rate_bps: i64,
        description: Option<&str>,
        requested_at: DateTime<Utc>,
    ) -> ResultEngine<Loan> {
        let loan = Loan::new(
            member_id,
            amount,
            interest_rate_bps,
            normalize_optional_text(description),
            requested_at,
        )?;
        with_tx!(self, |db_tx| {
            self.require_active_member(&db_tx, member_id).await?;
            loans::ActiveModel::from(&loan).insert(&db_tx).await?;
            Ok(())
        })?;
        tracing::info!(loan_id = %loan.id, member_id = %member_id, amount, "loan requested");
        Ok(loan)
    }

    /// Approves a pending loan and posts its disbursement to the passbook.
    ///
    /// Status change and disbursement entry commit together or not at all.
    /// Fails with `InvalidStateTransition` if the loan is no longer pending
    /// or the member already has an active loan, and with `InvalidAmount`
    /// if the principal exceeds 80 % of the member's deposits unless
    /// `terms.override_cap` is set.
    pub async fn approve_loan(
        &self,
        loan_id: Uuid,
        terms: ApprovalTerms,
        approved_at: DateTime<Utc>,
    ) -> ResultEngine<Loan> {
        terms.validate()?;

        let loan = with_tx!(self, |db_tx| {
            let loan = Loan::try_from(self.require_loan(&db_tx, loan_id).await?)?;
            loan.status.ensure_transition(LoanStatus::Active)?;

            let active = self.active_loans(&db_tx, loan.member_id).await?;
            if !active.is_empty() {
                return Err(EngineError::InvalidStateTransition(format!(
                    "member {} already has an active loan",
                    loan.member_id
                )));
            }

            let cap = eligibility_cap(self.sum_deposits(&db_tx, loan.member_id).await?);
            if loan.loan_amount > cap {
                if !terms.override_cap {
                    return Err(EngineError::InvalidAmount(format!(
                        "loan amount {} exceeds 80 % of deposits ({})",
                        Money::new(loan.loan_amount),
                        Money::new(cap)
                    )));
                }
                tracing::warn!(
                    loan_id = %loan.id,
                    amount = loan.loan_amount,
                    cap,
                    "approving loan above eligibility cap"
                );
            }

            self.swap_loan_status(
                &db_tx,
                loan_id,
                LoanStatus::Pending,
                LoanStatus::Active,
                Some(loan.loan_amount),
                approved_at,
            )
            .await?;

            if let (Some(count), Some(amount)) =
                (terms.installments_count, terms.installment_amount)
            {
                loans::Entity::update_many()
                    .col_expr(loans::Column::InstallmentsCount, Expr::value(count))
                    .col_expr(loans::Column::InstallmentAmount, Expr::value(amount))
                    .filter(loans::Column::Id.eq(loan_id.to_string()))
                    .exec(&db_tx)
                    .await?;
            }

            let mut description = format!("Loan disbursed: {}", Money::new(loan.loan_amount));
            if let (Some(count), Some(amount), Some(total)) = (
                terms.installments_count,
                terms.installment_amount,
                terms.total_payable(),
            ) {
                description.push_str(&format!(
                    ", Installments: {count}, EMI: {}, Total payable: {}",
                    Money::new(amount),
                    Money::new(total)
                ));
            }
            let disbursement =
                NewEntry::loan_approval(loan.member_id, loan.id, loan.loan_amount, approved_at)
                    .with_description(Some(description));
            self.insert_entry(&db_tx, &disbursement).await?;

            Ok(Loan {
                status: LoanStatus::Active,
                remaining_balance: loan.loan_amount,
                installments_count: terms.installments_count,
                installment_amount: terms.installment_amount,
                updated_at: approved_at,
                ..loan
            })
        })?;

        tracing::info!(loan_id = %loan.id, member_id = %loan.member_id, "loan approved");
        self.dispatch(Notification::loan_update(
            loan.member_id,
            format!(
                "Your loan request has been approved for {}.",
                Money::new(loan.loan_amount)
            ),
        ));
        Ok(loan)
    }

    /// Rejects a pending loan. Rejections never touch the passbook.
    pub async fn reject_loan(
        &self,
        loan_id: Uuid,
        rejected_at: DateTime<Utc>,
    ) -> ResultEngine<Loan> {
        let loan = with_tx!(self, |db_tx| {
            let loan = Loan::try_from(self.require_loan(&db_tx, loan_id).await?)?;
            loan.status.ensure_transition(LoanStatus::Rejected)?;
            self.swap_loan_status(
                &db_tx,
                loan_id,
                LoanStatus::Pending,
                LoanStatus::Rejected,
                None,
                rejected_at,
            )
            .await?;
            Ok(Loan {
                status: LoanStatus::Rejected,
                updated_at: rejected_at,
                ..loan
            })
        })?;

        tracing::info!(loan_id = %loan.id, member_id = %loan.member_id, "loan rejected");
        self.dispatch(Notification::loan_update(
            loan.member_id,
            "Your loan request has been rejected.",
        ));
        Ok(loan)
    }

    /// Outstanding balance of the member's newest active loan.
    ///
    /// The balance is derived from the passbook on every call. Several active
    /// loans are reported in `warnings` rather than failing the read.
    pub async fn remaining_balance(&self, member_id: Uuid) -> ResultEngine<LoanBalance> {
        with_tx!(self, |db_tx| {
            self.require_member(&db_tx, member_id).await?;
            let active = self.active_loans(&db_tx, member_id).await?;

            let mut warnings = Vec::new();
            if active.len() > 1 {
                let loan_ids: Vec<Uuid> = active.iter().map(|loan| loan.id).collect();
                tracing::error!(
                    member_id = %member_id,
                    loans = ?loan_ids,
                    "member has more than one active loan"
                );
                warnings.push(IntegrityWarning::MultipleActiveLoans {
                    member_id,
                    loan_ids,
                });
            }

            let Some(loan) = active.into_iter().next() else {
                return Ok(LoanBalance {
                    warnings,
                    ..LoanBalance::default()
                });
            };

            let remaining_balance = self.outstanding(&db_tx, &loan).await?;
            Ok(LoanBalance {
                loan_id: Some(loan.id),
                loan_amount: loan.loan_amount,
                remaining_balance,
                has_active_loan: true,
                warnings,
            })
        })
    }

    /// Posts an installment towards an active loan.
    ///
    /// Overpayment is rejected. When the installment clears the balance the
    /// loan is closed and a notification entry is added in the same commit.
    pub async fn record_installment(
        &self,
        loan_id: Uuid,
        amount: i64,
        interest: i64,
        paid_at: DateTime<Utc>,
        description: Option<&str>,
    ) -> ResultEngine<InstallmentReceipt> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(
                "installment must be > 0".to_string(),
            ));
        }

        let (receipt, member_id) = with_tx!(self, |db_tx| {
            let loan = Loan::try_from(self.require_loan(&db_tx, loan_id).await?)?;
            if loan.status != LoanStatus::Active {
                return Err(EngineError::InvalidStateTransition(format!(
                    "installments require an active loan, loan is {}",
                    loan.status.as_str()
                )));
            }

            let outstanding = self.outstanding(&db_tx, &loan).await?;
            if amount > outstanding {
                return Err(EngineError::InvalidAmount(format!(
                    "installment {} exceeds outstanding balance {}",
                    Money::new(amount),
                    Money::new(outstanding)
                )));
            }

            let entry = NewEntry::installment(loan.member_id, loan.id, amount, paid_at)
                .with_interest(interest)
                .with_description(normalize_optional_text(description));
            let entry_id = self.insert_entry(&db_tx, &entry).await?;

            let remaining_balance = outstanding - amount;
            let status = if remaining_balance == 0 {
                self.close_repaid(&db_tx, &loan, paid_at).await?;
                LoanStatus::Closed
            } else {
                LoanStatus::Active
            };

            Ok((
                InstallmentReceipt {
                    entry_id,
                    loan_id,
                    remaining_balance,
                    status,
                },
                loan.member_id,
            ))
        })?;

        let message = match receipt.status {
            LoanStatus::Closed => "Congratulations! Your loan has been fully paid off.".to_string(),
            _ => format!(
                "Installment of {} received. Outstanding balance: {}.",
                Money::new(amount),
                Money::new(receipt.remaining_balance)
            ),
        };
        tracing::info!(
            loan_id = %loan_id,
            entry_id = receipt.entry_id,
            remaining = receipt.remaining_balance,
            "installment recorded"
        );
        self.dispatch(Notification::loan_update(member_id, message));
        Ok(receipt)
    }

    /// Closes an active loan whose derived balance has reached zero.
    pub async fn close_loan(&self, loan_id: Uuid, closed_at: DateTime<Utc>) -> ResultEngine<Loan> {
        let loan = with_tx!(self, |db_tx| {
            let loan = Loan::try_from(self.require_loan(&db_tx, loan_id).await?)?;
            loan.status.ensure_transition(LoanStatus::Closed)?;
            let outstanding = self.outstanding(&db_tx, &loan).await?;
            if outstanding > 0 {
                return Err(EngineError::InvalidStateTransition(format!(
                    "loan still has an outstanding balance of {}",
                    Money::new(outstanding)
                )));
            }
            self.close_repaid(&db_tx, &loan, closed_at).await?;
            Ok(Loan {
                status: LoanStatus::Closed,
                updated_at: closed_at,
                ..loan
            })
        })?;

        tracing::info!(loan_id = %loan.id, "loan closed");
        self.dispatch(Notification::loan_update(
            loan.member_id,
            "Congratulations! Your loan has been fully paid off.",
        ));
        Ok(loan)
    }

    pub async fn loan(&self, loan_id: Uuid) -> ResultEngine<Loan> {
        Loan::try_from(self.require_loan(&self.database, loan_id).await?)
    }

    /// All loans of a member, newest first.
    pub async fn member_loans(&self, member_id: Uuid) -> ResultEngine<Vec<Loan>> {
        self.require_member(&self.database, member_id).await?;
        loans::Entity::find()
            .filter(loans::Column::MemberId.eq(member_id.to_string()))
            .order_by_desc(loans::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    /// Loan requests awaiting a decision, oldest first.
    pub async fn pending_loans(&self) -> ResultEngine<Vec<Loan>> {
        loans::Entity::find()
            .filter(loans::Column::Status.eq(LoanStatus::Pending.as_str()))
            .order_by_asc(loans::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    /// Active loans of a member, newest first.
    pub(super) async fn active_loans<C: ConnectionTrait>(
        &self,
        db: &C,
        member_id: Uuid,
    ) -> ResultEngine<Vec<Loan>> {
        loans::Entity::find()
            .filter(loans::Column::MemberId.eq(member_id.to_string()))
            .filter(loans::Column::Status.eq(LoanStatus::Active.as_str()))
            .order_by_desc(loans::Column::CreatedAt)
            .order_by_desc(loans::Column::UpdatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    /// `max(0, principal snapshot - installments paid)`.
    pub(super) async fn outstanding<C: ConnectionTrait>(
        &self,
        db: &C,
        loan: &Loan,
    ) -> ResultEngine<i64> {
        let paid = self.sum_installments(db, loan.member_id, loan.id).await?;
        Ok(Money::new(loan.remaining_balance)
            .floor_sub(Money::new(paid))
            .minor())
    }

    async fn close_repaid<C: ConnectionTrait>(
        &self,
        db: &C,
        loan: &Loan,
        closed_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        self.swap_loan_status(
            db,
            loan.id,
            LoanStatus::Active,
            LoanStatus::Closed,
            None,
            closed_at,
        )
        .await?;
        let marker = NewEntry::notification(
            loan.member_id,
            Some(loan.id),
            "Loan fully repaid",
            closed_at,
        );
        self.insert_entry(db, &marker).await?;
        Ok(())
    }

    /// Compare-and-swap on the loan status column.
    ///
    /// Exactly one row must move from `from` to `to`; otherwise someone else
    /// won the race and the caller gets `InvalidStateTransition`.
    async fn swap_loan_status<C: ConnectionTrait>(
        &self,
        db: &C,
        loan_id: Uuid,
        from: LoanStatus,
        to: LoanStatus,
        principal_snapshot: Option<i64>,
        at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        from.ensure_transition(to)?;
        let mut update = loans::Entity::update_many()
            .col_expr(loans::Column::Status, Expr::value(to.as_str()))
            .col_expr(loans::Column::UpdatedAt, Expr::value(at));
        if let Some(amount) = principal_snapshot {
            update = update.col_expr(loans::Column::RemainingBalance, Expr::value(amount));
        }
        let result = update
            .filter(loans::Column::Id.eq(loan_id.to_string()))
            .filter(loans::Column::Status.eq(from.as_str()))
            .exec(db)
            .await?;
        if result.rows_affected != 1 {
            return Err(EngineError::InvalidStateTransition(format!(
                "loan {loan_id} is no longer {}",
                from.as_str()
            )));
        }
        Ok(())
    }
}
