//! Maturity records.
//!
//! One record per member per maturity cycle. Interest figures are never
//! stored: [`MaturityView`] derives them from the record, the configured
//! [`InterestRate`] and the [`MaturityTerm`] every time a record is read.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, InterestRate, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityStatus {
    Pending,
    Claimed,
}

impl MaturityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
        }
    }
}

impl TryFrom<&str> for MaturityStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            other => Err(EngineError::Validation(format!(
                "invalid maturity status: {other}"
            ))),
        }
    }
}

/// Length of a maturity cycle in whole months.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityTerm {
    months: i32,
}

impl Default for MaturityTerm {
    /// Three years.
    fn default() -> Self {
        Self { months: 36 }
    }
}

impl MaturityTerm {
    pub fn from_months(months: i32) -> ResultEngine<Self> {
        if months <= 0 {
            return Err(EngineError::Validation(
                "maturity term must be > 0 months".to_string(),
            ));
        }
        Ok(Self { months })
    }

    pub fn months(self) -> i32 {
        self.months
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    /// 1-based cycle number for the member.
    pub cycle: i32,
    pub total_deposit: i64,
    pub months_completed: i32,
    pub status: MaturityStatus,
    pub manual_override: bool,
    /// Operator-supplied interest; only present while `manual_override` is on.
    pub adjusted_interest: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl MaturityRecord {
    pub fn new(
        member_id: Uuid,
        cycle: i32,
        total_deposit: i64,
        months_completed: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id,
            cycle,
            total_deposit,
            months_completed,
            status: MaturityStatus::Pending,
            manual_override: false,
            adjusted_interest: None,
            created_at,
            updated_at: created_at,
            claimed_at: None,
        }
    }
}

/// A record together with its derived interest figures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturityView {
    #[serde(flatten)]
    pub record: MaturityRecord,
    pub current_interest: i64,
    pub full_interest: i64,
    /// Effective adjusted interest: the override when set, otherwise
    /// `full_interest`.
    pub effective_interest: i64,
    /// `effective_interest - current_interest`: catch-up owed (or deducted)
    /// at claim time.
    pub current_adjustment: i64,
    /// Months left until the term is reached, never negative.
    pub remaining_months: i32,
    pub is_matured: bool,
}

impl MaturityView {
    pub fn derive(record: MaturityRecord, rate: InterestRate, term: MaturityTerm) -> Self {
        let current_interest = rate.current_interest(record.total_deposit, record.months_completed);
        let full_interest = rate.full_interest(record.total_deposit);
        let effective_interest = match (record.manual_override, record.adjusted_interest) {
            (true, Some(adjusted)) => adjusted,
            _ => full_interest,
        };
        let remaining_months = term.months().saturating_sub(record.months_completed).max(0);
        let is_matured = record.months_completed >= term.months();
        Self {
            record,
            current_interest,
            full_interest,
            effective_interest,
            current_adjustment: effective_interest - current_interest,
            remaining_months,
            is_matured,
        }
    }
}

/// Outcome of a maturity generation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "maturity_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub member_id: String,
    pub cycle: i32,
    pub total_deposit: i64,
    pub months_completed: i32,
    pub status: String,
    pub manual_override: bool,
    pub adjusted_interest: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub claimed_at: Option<DateTimeUtc>,
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
}

impl Related<super::members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&MaturityRecord> for ActiveModel {
    fn from(record: &MaturityRecord) -> Self {
        Self {
            id: ActiveValue::Set(record.id.to_string()),
            member_id: ActiveValue::Set(record.member_id.to_string()),
            cycle: ActiveValue::Set(record.cycle),
            total_deposit: ActiveValue::Set(record.total_deposit),
            months_completed: ActiveValue::Set(record.months_completed),
            status: ActiveValue::Set(record.status.as_str().to_string()),
            manual_override: ActiveValue::Set(record.manual_override),
            adjusted_interest: ActiveValue::Set(record.adjusted_interest),
            created_at: ActiveValue::Set(record.created_at),
            updated_at: ActiveValue::Set(record.updated_at),
            claimed_at: ActiveValue::Set(record.claimed_at),
        }
    }
}

impl TryFrom<Model> for MaturityRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "maturity record")?,
            member_id: parse_uuid(&model.member_id, "member")?,
            cycle: model.cycle,
            total_deposit: model.total_deposit,
            months_completed: model.months_completed,
            status: MaturityStatus::try_from(model.status.as_str())?,
            manual_override: model.manual_override,
            adjusted_interest: model.adjusted_interest,
            created_at: model.created_at,
            updated_at: model.updated_at,
            claimed_at: model.claimed_at,
        })
    }
}
