//! Passbook entries.
//!
//! A [`PassbookEntry`] is an immutable ledger row representing exactly one
//! economic event (or a zero-amount informational marker). Rows are never
//! updated or deleted; corrections are new rows.
//!
//! Amounts are integer **minor units** and must all be `>= 0`. Which amount
//! columns may be non-zero depends on the [`EntryMode`]:
//!
//! | mode           | required `> 0`     | may be `> 0`              | `loan_id`  |
//! |----------------|--------------------|---------------------------|------------|
//! | `Deposit`      | `deposit_amount`   | `fine_auto`               | forbidden  |
//! | `Installment`  | `loan_installment` | `interest_auto`, `fine_auto` | required |
//! | `LoanApproval` | `disbursed_amount` |                           | required   |
//! | `Notification` |                    |                           | optional   |

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// Ledger row identifier. Allocated in insertion order.
pub type EntryId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    Deposit,
    Installment,
    LoanApproval,
    Notification,
}

impl EntryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Installment => "installment",
            Self::LoanApproval => "loan_approval",
            Self::Notification => "notification",
        }
    }
}

impl TryFrom<&str> for EntryMode {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "deposit" => Ok(Self::Deposit),
            "installment" => Ok(Self::Installment),
            "loan_approval" => Ok(Self::LoanApproval),
            "notification" => Ok(Self::Notification),
            other => Err(EngineError::Validation(format!(
                "invalid passbook mode: {other}"
            ))),
        }
    }
}

/// A ledger row about to be appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub member_id: Uuid,
    pub loan_id: Option<Uuid>,
    pub mode: EntryMode,
    pub deposit_amount: i64,
    pub loan_installment: i64,
    pub interest_auto: i64,
    pub fine_auto: i64,
    pub disbursed_amount: i64,
    pub description: Option<String>,
    pub transaction_date: DateTime<Utc>,
}

impl NewEntry {
    fn blank(member_id: Uuid, mode: EntryMode, transaction_date: DateTime<Utc>) -> Self {
        Self {
            member_id,
            loan_id: None,
            mode,
            deposit_amount: 0,
            loan_installment: 0,
            interest_auto: 0,
            fine_auto: 0,
            disbursed_amount: 0,
            description: None,
            transaction_date,
        }
    }

    pub fn deposit(member_id: Uuid, amount: i64, transaction_date: DateTime<Utc>) -> Self {
        Self {
            deposit_amount: amount,
            ..Self::blank(member_id, EntryMode::Deposit, transaction_date)
        }
    }

    pub fn installment(
        member_id: Uuid,
        loan_id: Uuid,
        amount: i64,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            loan_id: Some(loan_id),
            loan_installment: amount,
            ..Self::blank(member_id, EntryMode::Installment, transaction_date)
        }
    }

    pub fn loan_approval(
        member_id: Uuid,
        loan_id: Uuid,
        amount: i64,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            loan_id: Some(loan_id),
            disbursed_amount: amount,
            ..Self::blank(member_id, EntryMode::LoanApproval, transaction_date)
        }
    }

    pub fn notification(
        member_id: Uuid,
        loan_id: Option<Uuid>,
        description: impl Into<String>,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            loan_id,
            description: Some(description.into()),
            ..Self::blank(member_id, EntryMode::Notification, transaction_date)
        }
    }

    pub fn with_interest(mut self, interest: i64) -> Self {
        self.interest_auto = interest;
        self
    }

    pub fn with_fine(mut self, fine: i64) -> Self {
        self.fine_auto = fine;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Checks amount signs and the mode/field matrix.
    pub fn validate(&self) -> ResultEngine<()> {
        let amounts = [
            ("deposit_amount", self.deposit_amount),
            ("loan_installment", self.loan_installment),
            ("interest_auto", self.interest_auto),
            ("fine_auto", self.fine_auto),
            ("disbursed_amount", self.disbursed_amount),
        ];
        for (label, value) in amounts {
            if value < 0 {
                return Err(EngineError::Validation(format!("{label} must be >= 0")));
            }
        }

        let (required, allowed): (Option<(&str, i64)>, &[&str]) = match self.mode {
            EntryMode::Deposit => (
                Some(("deposit_amount", self.deposit_amount)),
                &["deposit_amount", "fine_auto"],
            ),
            EntryMode::Installment => (
                Some(("loan_installment", self.loan_installment)),
                &["loan_installment", "interest_auto", "fine_auto"],
            ),
            EntryMode::LoanApproval => (
                Some(("disbursed_amount", self.disbursed_amount)),
                &["disbursed_amount"],
            ),
            EntryMode::Notification => (None, &[]),
        };

        if let Some((label, value)) = required
            && value == 0
        {
            return Err(EngineError::Validation(format!(
                "{} entry requires {label} > 0",
                self.mode.as_str()
            )));
        }
        if let Some((label, _)) = amounts
            .iter()
            .find(|(label, value)| *value != 0 && !allowed.contains(label))
        {
            return Err(EngineError::Validation(format!(
                "{} entry must not carry {label}",
                self.mode.as_str()
            )));
        }

        match (self.mode, self.loan_id) {
            (EntryMode::Deposit, Some(_)) => Err(EngineError::Validation(
                "deposit entry must not reference a loan".to_string(),
            )),
            (EntryMode::Installment | EntryMode::LoanApproval, None) => {
                Err(EngineError::Validation(format!(
                    "{} entry requires a loan id",
                    self.mode.as_str()
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassbookEntry {
    pub id: EntryId,
    pub member_id: Uuid,
    pub loan_id: Option<Uuid>,
    pub mode: EntryMode,
    pub deposit_amount: i64,
    pub loan_installment: i64,
    pub interest_auto: i64,
    pub fine_auto: i64,
    pub disbursed_amount: i64,
    pub description: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "passbook_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub member_id: String,
    pub loan_id: Option<String>,
    pub mode: String,
    pub deposit_amount: i64,
    pub loan_installment: i64,
    pub interest_auto: i64,
    pub fine_auto: i64,
    pub disbursed_amount: i64,
    pub description: Option<String>,
    pub transaction_date: DateTimeUtc,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::members::Entity",
        from = "Column::MemberId",
        to = "super::members::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Members,
    #[sea_orm(
        belongs_to = "super::loans::Entity",
        from = "Column::LoanId",
        to = "super::loans::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Loans,
}

impl Related<super::members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::loans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Loans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn from_new(entry: &NewEntry, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: ActiveValue::NotSet,
            member_id: ActiveValue::Set(entry.member_id.to_string()),
            loan_id: ActiveValue::Set(entry.loan_id.map(|id| id.to_string())),
            mode: ActiveValue::Set(entry.mode.as_str().to_string()),
            deposit_amount: ActiveValue::Set(entry.deposit_amount),
            loan_installment: ActiveValue::Set(entry.loan_installment),
            interest_auto: ActiveValue::Set(entry.interest_auto),
            fine_auto: ActiveValue::Set(entry.fine_auto),
            disbursed_amount: ActiveValue::Set(entry.disbursed_amount),
            description: ActiveValue::Set(entry.description.clone()),
            transaction_date: ActiveValue::Set(entry.transaction_date),
            recorded_at: ActiveValue::Set(recorded_at),
        }
    }
}

impl TryFrom<Model> for PassbookEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            member_id: parse_uuid(&model.member_id, "member")?,
            loan_id: model
                .loan_id
                .as_deref()
                .map(|id| parse_uuid(id, "loan"))
                .transpose()?,
            mode: EntryMode::try_from(model.mode.as_str())?,
            deposit_amount: model.deposit_amount,
            loan_installment: model.loan_installment,
            interest_auto: model.interest_auto,
            fine_auto: model.fine_auto,
            disbursed_amount: model.disbursed_amount,
            description: model.description,
            transaction_date: model.transaction_date,
            recorded_at: model.recorded_at,
        })
    }
}
