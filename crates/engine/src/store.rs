//! Membership store: the read-only queries the dispatcher and scheduler issue.
//!
//! `MembershipStore` is the seam to the external database; `PgMembershipStore`
//! is the Postgres implementation over the schema in `migrations/`.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use chit_common::error::AppError;
use chit_common::types::{Group, Member, PushAddress};

/// Narrowing applied when listing a group's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    None,
    ExcludeUser(Uuid),
    /// Only members whose contribution is still pending
    OnlyPending,
    /// The latest-created member without a registered user id (at most one)
    OnlyUnregisteredMostRecent,
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn group(&self, group_id: Uuid) -> Result<Option<Group>, AppError>;

    async fn members(&self, group_id: Uuid, exclusion: Exclusion)
    -> Result<Vec<Member>, AppError>;

    async fn member_by_user(&self, group_id: Uuid, user_id: Uuid)
    -> Result<Option<Member>, AppError>;

    async fn push_addresses(&self, user_ids: &[Uuid]) -> Result<Vec<PushAddress>, AppError>;

    /// Phone number on the user's profile, if any.
    async fn profile_phone(&self, user_id: Uuid) -> Result<Option<String>, AppError>;

    /// Groups whose next draw falls on any of `dates`.
    async fn groups_drawing_on(&self, dates: &[NaiveDate]) -> Result<Vec<Group>, AppError>;
}

const GROUP_COLUMNS: &str = r#"
    g.id, g.name, g.monthly_amount, g.draw_date,
    (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id)::int4 AS member_count
"#;

const MEMBER_COLUMNS: &str =
    "id, group_id, user_id, name, phone, invited_phone, contribution_status, created_at";

/// Postgres-backed membership store.
#[derive(Clone)]
pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn group(&self, group_id: Uuid) -> Result<Option<Group>, AppError> {
        let group: Option<Group> =
            sqlx::query_as(&format!("SELECT {GROUP_COLUMNS} FROM groups g WHERE g.id = $1"))
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(group)
    }

    async fn members(
        &self,
        group_id: Uuid,
        exclusion: Exclusion,
    ) -> Result<Vec<Member>, AppError> {
        let members: Vec<Member> = match exclusion {
            Exclusion::None => {
                sqlx::query_as(&format!(
                    "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = $1 ORDER BY created_at"
                ))
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?
            }
            Exclusion::ExcludeUser(user_id) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {MEMBER_COLUMNS} FROM group_members
                    WHERE group_id = $1
                      AND (user_id IS NULL OR user_id <> $2)
                    ORDER BY created_at
                    "#
                ))
                .bind(group_id)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            Exclusion::OnlyPending => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {MEMBER_COLUMNS} FROM group_members
                    WHERE group_id = $1
                      AND contribution_status = 'pending'
                    ORDER BY created_at
                    "#
                ))
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?
            }
            Exclusion::OnlyUnregisteredMostRecent => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {MEMBER_COLUMNS} FROM group_members
                    WHERE group_id = $1
                      AND user_id IS NULL
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#
                ))
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(members)
    }

    async fn member_by_user(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Member>, AppError> {
        let member: Option<Member> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = $1 AND user_id = $2 LIMIT 1"
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn push_addresses(&self, user_ids: &[Uuid]) -> Result<Vec<PushAddress>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let addresses: Vec<PushAddress> = sqlx::query_as(
            "SELECT user_id, token FROM push_tokens WHERE user_id = ANY($1) ORDER BY created_at",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(addresses)
    }

    async fn profile_phone(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let phone: Option<Option<String>> =
            sqlx::query_scalar("SELECT phone FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(phone.flatten())
    }

    async fn groups_drawing_on(&self, dates: &[NaiveDate]) -> Result<Vec<Group>, AppError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let groups: Vec<Group> = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups g WHERE g.draw_date = ANY($1) ORDER BY g.draw_date, g.id"
        ))
        .bind(dates)
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }
}
