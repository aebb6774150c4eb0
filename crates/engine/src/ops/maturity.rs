use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    EngineError, GenerationSummary, MaturityRecord, MaturityStatus, MaturityView, Member,
    MemberStatus, Money, Notification, ResultEngine, maturity, members,
    util::whole_months_between,
};

use super::{Engine, with_tx};

enum CycleOutcome {
    Created,
    Updated,
    Skipped,
}

impl Engine {
    /// Materializes the current maturity cycle of every active member.
    ///
    /// Members without a pending record get a new one (unless they have no
    /// deposits yet); pending records are refreshed in place, so the pass can
    /// be re-run any number of times within a cycle. Manual overrides are
    /// left untouched.
    pub async fn generate_maturity_records(
        &self,
        as_of: DateTime<Utc>,
    ) -> ResultEngine<GenerationSummary> {
        let summary = with_tx!(self, |db_tx| {
            let active_members = members::Entity::find()
                .filter(members::Column::Status.eq(MemberStatus::Active.as_str()))
                .order_by_asc(members::Column::EnrolledAt)
                .order_by_asc(members::Column::Id)
                .all(&db_tx)
                .await?;

            let mut summary = GenerationSummary::default();
            for model in active_members {
                let member = Member::try_from(model)?;
                match self.refresh_cycle(&db_tx, &member, as_of).await? {
                    CycleOutcome::Created => summary.created += 1,
                    CycleOutcome::Updated => summary.updated += 1,
                    CycleOutcome::Skipped => summary.skipped += 1,
                }
            }
            Ok(summary)
        })?;

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            "maturity records generated"
        );
        Ok(summary)
    }

    /// Sets or clears the manual interest override of a pending record.
    ///
    /// With `manual_override` on, `adjusted_interest` is required and stored
    /// verbatim. With it off, any stored amount is cleared and the effective
    /// interest falls back to the full-year figure.
    pub async fn adjust_maturity(
        &self,
        record_id: Uuid,
        manual_override: bool,
        adjusted_interest: Option<i64>,
        adjusted_at: DateTime<Utc>,
    ) -> ResultEngine<MaturityView> {
        let stored = match (manual_override, adjusted_interest) {
            (true, None) => {
                return Err(EngineError::Validation(
                    "adjusted interest is required when manual override is enabled".to_string(),
                ));
            }
            (true, Some(amount)) if amount < 0 => {
                return Err(EngineError::Validation(
                    "adjusted interest must be >= 0".to_string(),
                ));
            }
            (true, Some(amount)) => Some(amount),
            (false, _) => None,
        };

        let record = with_tx!(self, |db_tx| {
            let record =
                MaturityRecord::try_from(self.require_maturity_record(&db_tx, record_id).await?)?;
            if record.status != MaturityStatus::Pending {
                return Err(EngineError::InvalidStateTransition(
                    "claimed maturity records cannot be adjusted".to_string(),
                ));
            }

            let result = maturity::Entity::update_many()
                .col_expr(maturity::Column::ManualOverride, Expr::value(manual_override))
                .col_expr(maturity::Column::AdjustedInterest, Expr::value(stored))
                .col_expr(maturity::Column::UpdatedAt, Expr::value(adjusted_at))
                .filter(maturity::Column::Id.eq(record_id.to_string()))
                .filter(maturity::Column::Status.eq(MaturityStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected != 1 {
                return Err(EngineError::InvalidStateTransition(
                    "maturity record was claimed concurrently".to_string(),
                ));
            }

            Ok(MaturityRecord {
                manual_override,
                adjusted_interest: stored,
                updated_at: adjusted_at,
                ..record
            })
        })?;

        tracing::info!(
            record_id = %record_id,
            manual_override,
            adjusted_interest = ?stored,
            "maturity record adjusted"
        );
        Ok(MaturityView::derive(record, self.rate, self.term))
    }

    /// Marks a pending record as claimed. Claimed records are final.
    pub async fn claim(
        &self,
        record_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> ResultEngine<MaturityView> {
        let record = with_tx!(self, |db_tx| {
            let record =
                MaturityRecord::try_from(self.require_maturity_record(&db_tx, record_id).await?)?;
            let result = maturity::Entity::update_many()
                .col_expr(
                    maturity::Column::Status,
                    Expr::value(MaturityStatus::Claimed.as_str()),
                )
                .col_expr(maturity::Column::ClaimedAt, Expr::value(Some(claimed_at)))
                .col_expr(maturity::Column::UpdatedAt, Expr::value(claimed_at))
                .filter(maturity::Column::Id.eq(record_id.to_string()))
                .filter(maturity::Column::Status.eq(MaturityStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected != 1 {
                return Err(EngineError::InvalidStateTransition(format!(
                    "maturity record {record_id} is already claimed"
                )));
            }
            Ok(MaturityRecord {
                status: MaturityStatus::Claimed,
                claimed_at: Some(claimed_at),
                updated_at: claimed_at,
                ..record
            })
        })?;

        let view = MaturityView::derive(record, self.rate, self.term);
        tracing::info!(record_id = %record_id, member_id = %view.record.member_id, "maturity claimed");
        self.dispatch(Notification::maturity_update(
            view.record.member_id,
            format!(
                "Your maturity payout of {} has been claimed.",
                Money::new(view.effective_interest)
            ),
        ));
        Ok(view)
    }

    pub async fn maturity_record(&self, record_id: Uuid) -> ResultEngine<MaturityView> {
        let model = self
            .require_maturity_record(&self.database, record_id)
            .await?;
        Ok(MaturityView::derive(
            MaturityRecord::try_from(model)?,
            self.rate,
            self.term,
        ))
    }

    /// The member's current record: the pending one if any, otherwise the
    /// latest claimed one.
    pub async fn member_maturity_record(&self, member_id: Uuid) -> ResultEngine<MaturityView> {
        self.require_member(&self.database, member_id).await?;
        let model = match self.pending_record(&self.database, member_id).await? {
            Some(model) => model,
            None => maturity::Entity::find()
                .filter(maturity::Column::MemberId.eq(member_id.to_string()))
                .order_by_desc(maturity::Column::Cycle)
                .one(&self.database)
                .await?
                .ok_or_else(|| EngineError::NotFound("maturity record not exists".to_string()))?,
        };
        Ok(MaturityView::derive(
            MaturityRecord::try_from(model)?,
            self.rate,
            self.term,
        ))
    }

    /// Current record of the member linked to `user_id`.
    pub async fn maturity_record_for_user(&self, user_id: &str) -> ResultEngine<MaturityView> {
        let member = self.member_for_user(user_id).await?;
        self.member_maturity_record(member.id).await
    }

    /// All records, optionally filtered by status, oldest first.
    pub async fn maturity_records(
        &self,
        status: Option<MaturityStatus>,
    ) -> ResultEngine<Vec<MaturityView>> {
        let mut query = maturity::Entity::find();
        if let Some(status) = status {
            query = query.filter(maturity::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_asc(maturity::Column::CreatedAt)
            .order_by_asc(maturity::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(|model| {
                MaturityRecord::try_from(model)
                    .map(|record| MaturityView::derive(record, self.rate, self.term))
            })
            .collect()
    }

    async fn refresh_cycle<C: ConnectionTrait>(
        &self,
        db: &C,
        member: &Member,
        as_of: DateTime<Utc>,
    ) -> ResultEngine<CycleOutcome> {
        let total_deposit = self.sum_deposits(db, member.id).await?;
        let (next_cycle, anchor) = self.cycle_anchor(db, member).await?;
        let months_completed = whole_months_between(anchor, as_of);

        match self.pending_record(db, member.id).await? {
            Some(model) => {
                if model.total_deposit == total_deposit
                    && model.months_completed == months_completed
                {
                    return Ok(CycleOutcome::Skipped);
                }
                let result = maturity::Entity::update_many()
                    .col_expr(maturity::Column::TotalDeposit, Expr::value(total_deposit))
                    .col_expr(
                        maturity::Column::MonthsCompleted,
                        Expr::value(months_completed),
                    )
                    .col_expr(maturity::Column::UpdatedAt, Expr::value(as_of))
                    .filter(maturity::Column::Id.eq(model.id))
                    .filter(maturity::Column::Status.eq(MaturityStatus::Pending.as_str()))
                    .exec(db)
                    .await?;
                Ok(if result.rows_affected == 1 {
                    CycleOutcome::Updated
                } else {
                    CycleOutcome::Skipped
                })
            }
            None if total_deposit == 0 => Ok(CycleOutcome::Skipped),
            None => {
                let record = MaturityRecord::new(
                    member.id,
                    next_cycle,
                    total_deposit,
                    months_completed,
                    as_of,
                );
                maturity::ActiveModel::from(&record).insert(db).await?;
                Ok(CycleOutcome::Created)
            }
        }
    }

    /// Next cycle number and the instant its months are counted from: the
    /// last claim, or enrollment for a member who never claimed.
    async fn cycle_anchor<C: ConnectionTrait>(
        &self,
        db: &C,
        member: &Member,
    ) -> ResultEngine<(i32, DateTime<Utc>)> {
        let last_claimed = maturity::Entity::find()
            .filter(maturity::Column::MemberId.eq(member.id.to_string()))
            .filter(maturity::Column::Status.eq(MaturityStatus::Claimed.as_str()))
            .order_by_desc(maturity::Column::Cycle)
            .one(db)
            .await?;
        Ok(match last_claimed {
            Some(model) => (model.cycle + 1, model.claimed_at.unwrap_or(model.updated_at)),
            None => (1, member.enrolled_at),
        })
    }

    async fn pending_record<C: ConnectionTrait>(
        &self,
        db: &C,
        member_id: Uuid,
    ) -> ResultEngine<Option<maturity::Model>> {
        maturity::Entity::find()
            .filter(maturity::Column::MemberId.eq(member_id.to_string()))
            .filter(maturity::Column::Status.eq(MaturityStatus::Pending.as_str()))
            .one(db)
            .await
            .map_err(Into::into)
    }
}
