//! Loans and their status machine.
//!
//! ```text
//! pending --approve--> active --fully repaid--> closed
//!    \
//!     --reject--> rejected
//! ```
//!
//! `rejected` and `closed` are terminal. `remaining_balance` is the principal
//! snapshot taken at approval; the live outstanding balance is always derived
//! from the passbook.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, IntegrityWarning, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Active,
    Rejected,
    Closed,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Closed)
    }

    /// Checks that moving from `self` to `next` is an edge of the machine.
    pub fn ensure_transition(self, next: LoanStatus) -> ResultEngine<()> {
        let allowed = matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Rejected)
                | (Self::Active, Self::Closed)
        );
        if !allowed {
            return Err(EngineError::InvalidStateTransition(format!(
                "loan cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            )));
        }
        Ok(())
    }
}

impl TryFrom<&str> for LoanStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            "closed" => Ok(Self::Closed),
            other => Err(EngineError::Validation(format!(
                "invalid loan status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub member_id: Uuid,
    pub loan_amount: i64,
    pub interest_rate_bps: i64,
    pub remaining_balance: i64,
    pub status: LoanStatus,
    pub description: Option<String>,
    /// Repayment plan fixed at approval, if the operator set one.
    pub installments_count: Option<i32>,
    pub installment_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn new(
        member_id: Uuid,
        loan_amount: i64,
        interest_rate_bps: i64,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if loan_amount <= 0 {
            return Err(EngineError::InvalidAmount(
                "loan amount must be > 0".to_string(),
            ));
        }
        if interest_rate_bps < 0 {
            return Err(EngineError::Validation(
                "interest rate must be >= 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            member_id,
            loan_amount,
            interest_rate_bps,
            remaining_balance: 0,
            status: LoanStatus::Pending,
            description,
            installments_count: None,
            installment_amount: None,
            created_at,
            updated_at: created_at,
        })
    }
}

/// Operator decisions taken when approving a loan.
///
/// Without `override_cap` the principal must not exceed 80 % of the member's
/// deposits at approval time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTerms {
    pub override_cap: bool,
    pub installments_count: Option<i32>,
    pub installment_amount: Option<i64>,
}

impl ApprovalTerms {
    /// Approve only within the eligibility cap.
    pub fn within_cap() -> Self {
        Self::default()
    }

    /// Approve even above the eligibility cap.
    pub fn overriding_cap() -> Self {
        Self {
            override_cap: true,
            ..Self::default()
        }
    }

    /// Fixes the repayment plan: `installments_count` monthly installments
    /// of `installment_amount` paise each.
    pub fn with_schedule(mut self, installments_count: i32, installment_amount: i64) -> Self {
        self.installments_count = Some(installments_count);
        self.installment_amount = Some(installment_amount);
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        match (self.installments_count, self.installment_amount) {
            (None, None) => Ok(()),
            (Some(count), Some(amount)) => {
                if count <= 0 {
                    return Err(EngineError::Validation(
                        "installments count must be > 0".to_string(),
                    ));
                }
                if amount <= 0 {
                    return Err(EngineError::InvalidAmount(
                        "installment amount must be > 0".to_string(),
                    ));
                }
                if self.total_payable().is_none() {
                    return Err(EngineError::InvalidAmount(
                        "repayment schedule total overflows".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Err(EngineError::Validation(
                "installments count and installment amount go together".to_string(),
            )),
        }
    }

    /// Total the member repays under the schedule, if one is set.
    pub fn total_payable(&self) -> Option<i64> {
        let count = i64::from(self.installments_count?);
        self.installment_amount?.checked_mul(count)
    }
}

/// Outstanding balance of a member's active loan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBalance {
    pub loan_id: Option<Uuid>,
    pub loan_amount: i64,
    pub remaining_balance: i64,
    pub has_active_loan: bool,
    pub warnings: Vec<IntegrityWarning>,
}

/// Result of posting an installment through the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentReceipt {
    pub entry_id: i64,
    pub loan_id: Uuid,
    pub remaining_balance: i64,
    pub status: LoanStatus,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "loans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub member_id: String,
    pub loan_amount: i64,
    pub interest_rate_bps: i64,
    pub remaining_balance: i64,
    pub status: String,
    pub description: Option<String>,
    pub installments_count: Option<i32>,
    pub installment_amount: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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
    #[sea_orm(has_many = "super::passbook::Entity")]
    PassbookEntries,
}

impl Related<super::members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::passbook::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PassbookEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Loan> for ActiveModel {
    fn from(loan: &Loan) -> Self {
        Self {
            id: ActiveValue::Set(loan.id.to_string()),
            member_id: ActiveValue::Set(loan.member_id.to_string()),
            loan_amount: ActiveValue::Set(loan.loan_amount),
            interest_rate_bps: ActiveValue::Set(loan.interest_rate_bps),
            remaining_balance: ActiveValue::Set(loan.remaining_balance),
            status: ActiveValue::Set(loan.status.as_str().to_string()),
            description: ActiveValue::Set(loan.description.clone()),
            installments_count: ActiveValue::Set(loan.installments_count),
            installment_amount: ActiveValue::Set(loan.installment_amount),
            created_at: ActiveValue::Set(loan.created_at),
            updated_at: ActiveValue::Set(loan.updated_at),
        }
    }
}

impl TryFrom<Model> for Loan {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "loan")?,
            member_id: parse_uuid(&model.member_id, "member")?,
            loan_amount: model.loan_amount,
            interest_rate_bps: model.interest_rate_bps,
            remaining_balance: model.remaining_balance,
            status: LoanStatus::try_from(model.status.as_str())?,
            description: model.description,
            installments_count: model.installments_count,
            installment_amount: model.installment_amount,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
