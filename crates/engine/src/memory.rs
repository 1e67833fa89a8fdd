//! In-memory `MembershipStore` for local runs and tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use chit_common::error::AppError;
use chit_common::types::{ContributionStatus, Group, Member, PushAddress};

use crate::store::{Exclusion, MembershipStore};

#[derive(Default)]
struct Inner {
    groups: Vec<Group>,
    members: Vec<Member>,
    push: Vec<PushAddress>,
    phones: HashMap<Uuid, String>,
}

/// Membership data held in process. `set_failing(true)` makes every query error.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    inner: RwLock<Inner>,
    failing: AtomicBool,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Add a group and return its id.
    pub fn add_group(&self, name: &str, monthly_amount: f64, draw_date: Option<NaiveDate>) -> Uuid {
        let id = Uuid::new_v4();
        self.write().groups.push(Group {
            id,
            name: name.to_string(),
            monthly_amount,
            draw_date,
            member_count: 0,
        });
        id
    }

    /// Add a registered member and return their user id.
    pub fn add_member(&self, group_id: Uuid, name: &str, status: ContributionStatus) -> Uuid {
        let user_id = Uuid::new_v4();
        self.insert_member(group_id, Some(user_id), name, None, status);
        user_id
    }

    /// Add an invitee without an account and return the member row id.
    pub fn add_invitee(&self, group_id: Uuid, name: &str, invited_phone: &str) -> Uuid {
        self.insert_member(
            group_id,
            None,
            name,
            Some(invited_phone.to_string()),
            ContributionStatus::Pending,
        )
    }

    pub fn add_push_token(&self, user_id: Uuid, token: &str) {
        self.write().push.push(PushAddress {
            user_id,
            token: token.to_string(),
        });
    }

    pub fn set_profile_phone(&self, user_id: Uuid, phone: &str) {
        self.write().phones.insert(user_id, phone.to_string());
    }

    /// Overwrite the phone numbers on a registered member's row.
    pub fn set_member_phones(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        invited_phone: Option<&str>,
        phone: Option<&str>,
    ) {
        let mut inner = self.write();
        if let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.group_id == group_id && m.user_id == Some(user_id))
        {
            member.invited_phone = invited_phone.map(str::to_string);
            member.phone = phone.map(str::to_string);
        }
    }

    fn insert_member(
        &self,
        group_id: Uuid,
        user_id: Option<Uuid>,
        name: &str,
        invited_phone: Option<String>,
        status: ContributionStatus,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.write();
        // Strictly increasing timestamps keep "most recent" well defined.
        let created_at = Utc::now() + Duration::milliseconds(inner.members.len() as i64);
        inner.members.push(Member {
            id,
            group_id,
            user_id,
            name: Some(name.to_string()),
            phone: None,
            invited_phone,
            contribution_status: status,
            created_at,
        });
        if let Some(group) = inner.groups.iter_mut().find(|g| g.id == group_id) {
            group.member_count += 1;
        }
        id
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("membership store unavailable".to_string()));
        }
        Ok(self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn group(&self, group_id: Uuid) -> Result<Option<Group>, AppError> {
        Ok(self.read()?.groups.iter().find(|g| g.id == group_id).cloned())
    }

    async fn members(&self, group_id: Uuid, exclusion: Exclusion) -> Result<Vec<Member>, AppError> {
        let inner = self.read()?;
        let mut members: Vec<Member> = inner
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .filter(|m| match exclusion {
                Exclusion::None => true,
                Exclusion::ExcludeUser(user_id) => m.user_id != Some(user_id),
                Exclusion::OnlyPending => m.contribution_status == ContributionStatus::Pending,
                Exclusion::OnlyUnregisteredMostRecent => m.user_id.is_none(),
            })
            .cloned()
            .collect();

        if exclusion == Exclusion::OnlyUnregisteredMostRecent {
            members.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            members.truncate(1);
        }
        Ok(members)
    }

    async fn member_by_user(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Member>, AppError> {
        Ok(self
            .read()?
            .members
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == Some(user_id))
            .cloned())
    }

    async fn push_addresses(&self, user_ids: &[Uuid]) -> Result<Vec<PushAddress>, AppError> {
        Ok(self
            .read()?
            .push
            .iter()
            .filter(|p| user_ids.contains(&p.user_id))
            .cloned()
            .collect())
    }

    async fn profile_phone(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self.read()?.phones.get(&user_id).cloned())
    }

    async fn groups_drawing_on(&self, dates: &[NaiveDate]) -> Result<Vec<Group>, AppError> {
        Ok(self
            .read()?
            .groups
            .iter()
            .filter(|g| g.draw_date.is_some_and(|d| dates.contains(&d)))
            .cloned()
            .collect())
    }
}
