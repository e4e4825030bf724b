//! Guild independent user state: authority flags.

use crate::{
    entities::{User, user},
    errors::Result,
};
use sea_orm::{Set, prelude::*, sea_query::OnConflict};
use tracing::info;

/// Authority flags a developer can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserFlag {
    Developer,
    BetaTester,
    Staff,
}

impl UserFlag {
    pub const ALL: [Self; 3] = [Self::Developer, Self::BetaTester, Self::Staff];

    #[must_use]
    pub const fn bit(self) -> i64 {
        match self {
            Self::Developer => 1,
            Self::BetaTester => 1 << 1,
            Self::Staff => 1 << 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::BetaTester => "beta",
            Self::Staff => "staff",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.as_str().eq_ignore_ascii_case(name))
    }
}

/// Set of [`UserFlag`]s stored as a bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFlags(pub i64);

impl UserFlags {
    #[must_use]
    pub const fn contains(self, flag: UserFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    #[must_use]
    pub const fn with(self, flag: UserFlag) -> Self {
        Self(self.0 | flag.bit())
    }

    #[must_use]
    pub const fn without(self, flag: UserFlag) -> Self {
        Self(self.0 & !flag.bit())
    }

    /// Names of the flags set, for display.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        UserFlag::ALL
            .into_iter()
            .filter(|flag| self.contains(*flag))
            .map(UserFlag::as_str)
            .collect()
    }
}

/// Finds a user row without creating it.
pub async fn find_user<C>(db: &C, user_id: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Returns the user row, inserting an empty one if missing.
pub async fn find_or_create_user<C>(db: &C, user_id: &str) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if let Some(model) = find_user(db, user_id).await? {
        return Ok(model);
    }

    let row = user::ActiveModel {
        id: Set(user_id.to_string()),
        flags: Set(0),
    };
    User::insert(row)
        .on_conflict(OnConflict::column(user::Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {user_id}")).into())
}

/// Flags of a user, empty when the user was never stored.
pub async fn user_flags<C>(db: &C, user_id: &str) -> Result<UserFlags>
where
    C: ConnectionTrait,
{
    Ok(find_user(db, user_id)
        .await?
        .map_or_else(UserFlags::default, |user| UserFlags(user.flags)))
}

async fn set_flags<C>(db: &C, user_id: &str, flags: UserFlags) -> Result<UserFlags>
where
    C: ConnectionTrait,
{
    let model = find_or_create_user(db, user_id).await?;
    let mut active: user::ActiveModel = model.into();
    active.flags = Set(flags.0);
    let model = active.update(db).await?;
    Ok(UserFlags(model.flags))
}

/// Adds `flag` to a user; returns `false` when it was already set.
pub async fn grant_flag<C>(db: &C, user_id: &str, flag: UserFlag) -> Result<bool>
where
    C: ConnectionTrait,
{
    let flags = user_flags(db, user_id).await?;
    if flags.contains(flag) {
        return Ok(false);
    }
    set_flags(db, user_id, flags.with(flag)).await?;
    info!("Granted {} to user {}", flag.as_str(), user_id);
    Ok(true)
}

/// Removes `flag` from a user; returns `false` when it was not set.
pub async fn revoke_flag<C>(db: &C, user_id: &str, flag: UserFlag) -> Result<bool>
where
    C: ConnectionTrait,
{
    let flags = user_flags(db, user_id).await?;
    if !flags.contains(flag) {
        return Ok(false);
    }
    set_flags(db, user_id, flags.without(flag)).await?;
    info!("Revoked {} from user {}", flag.as_str(), user_id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_flag_bits() {
        let flags = UserFlags::default()
            .with(UserFlag::Staff)
            .with(UserFlag::Developer);
        assert!(flags.contains(UserFlag::Staff));
        assert!(!flags.contains(UserFlag::BetaTester));
        assert_eq!(flags.names(), vec!["developer", "staff"]);
        assert!(!flags.without(UserFlag::Staff).contains(UserFlag::Staff));
        assert_eq!(UserFlag::parse("BETA"), Some(UserFlag::BetaTester));
    }

    #[tokio::test]
    async fn test_grant_and_revoke() -> Result<()> {
        let db = setup_test_db().await?;

        assert_eq!(user_flags(&db, "u").await?, UserFlags::default());
        assert!(grant_flag(&db, "u", UserFlag::BetaTester).await?);
        assert!(!grant_flag(&db, "u", UserFlag::BetaTester).await?);
        assert!(user_flags(&db, "u").await?.contains(UserFlag::BetaTester));

        assert!(revoke_flag(&db, "u", UserFlag::BetaTester).await?);
        assert!(!revoke_flag(&db, "u", UserFlag::BetaTester).await?);
        assert_eq!(user_flags(&db, "u").await?, UserFlags::default());
        Ok(())
    }
}
