use sea_orm::{QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{EngineError, Member, ResultEngine, loans, maturity, members};

use super::Engine;

/// Generates a `require_*` lookup that maps a missing row to `NotFound`.
macro_rules! impl_require_by_id {
    ($require_fn:ident, $entity:path, $model:path, $err_msg:literal) => {
        pub(super) async fn $require_fn<C: ConnectionTrait>(
            &self,
            db: &C,
            id: Uuid,
        ) -> ResultEngine<$model> {
            <$entity>::find_by_id(id.to_string())
                .one(db)
                .await?
                .ok_or_else(|| EngineError::NotFound($err_msg.to_string()))
        }
    };
}

impl Engine {
    impl_require_by_id!(
        require_member,
        members::Entity,
        members::Model,
        "member not exists"
    );

    impl_require_by_id!(require_loan, loans::Entity, loans::Model, "loan not exists");

    impl_require_by_id!(
        require_maturity_record,
        maturity::Entity,
        maturity::Model,
        "maturity record not exists"
    );

    pub(super) async fn require_active_member<C: ConnectionTrait>(
        &self,
        db: &C,
        member_id: Uuid,
    ) -> ResultEngine<Member> {
        let member = Member::try_from(self.require_member(db, member_id).await?)?;
        if !member.is_active() {
            return Err(EngineError::Validation(format!(
                "member {member_id} is inactive"
            )));
        }
        Ok(member)
    }

    /// Resolves the member linked to an authenticated identity.
    ///
    /// Only the explicit `user_id` link is honoured: an identity without a
    /// linked member is `NotFound`.
    pub async fn member_for_user(&self, user_id: &str) -> ResultEngine<Member> {
        let model = members::Entity::find()
            .filter(members::Column::UserId.eq(user_id.to_string()))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("no member linked to user".to_string()))?;
        Member::try_from(model)
    }

    pub async fn member(&self, member_id: Uuid) -> ResultEngine<Member> {
        Member::try_from(self.require_member(&self.database, member_id).await?)
    }
}
