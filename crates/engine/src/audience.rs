//! Audience resolution: which members hear about an event.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use chit_common::error::AppError;
use chit_common::types::MemberIdentity;

use crate::store::{Exclusion, MembershipStore};

pub struct AudienceResolver {
    store: Arc<dyn MembershipStore>,
}

impl AudienceResolver {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }

    /// Members of `group_id` after `exclusion`, without duplicate identities.
    ///
    /// A failed query is fatal for the event: payloads can embed totals, so a
    /// partial audience is never returned.
    pub async fn resolve(
        &self,
        group_id: Uuid,
        exclusion: Exclusion,
    ) -> Result<Vec<MemberIdentity>, AppError> {
        let members = self
            .store
            .members(group_id, exclusion)
            .await
            .map_err(|e| AppError::AudienceLookup(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut audience: Vec<MemberIdentity> = members
            .into_iter()
            .map(MemberIdentity::from)
            .filter(|identity| match exclusion {
                Exclusion::ExcludeUser(excluded) => identity.user_id != Some(excluded),
                Exclusion::OnlyUnregisteredMostRecent => identity.user_id.is_none(),
                _ => true,
            })
            .filter(|identity| identity.key().is_some_and(|key| seen.insert(key)))
            .collect();

        if exclusion == Exclusion::OnlyUnregisteredMostRecent {
            audience.truncate(1);
        }

        tracing::debug!(
            group_id = %group_id,
            exclusion = ?exclusion,
            audience = audience.len(),
            "Audience resolved"
        );
        Ok(audience)
    }

    /// A single user, enriched with their membership row when a group is known.
    pub async fn resolve_user(
        &self,
        group_id: Option<Uuid>,
        user_id: Uuid,
    ) -> Result<Vec<MemberIdentity>, AppError> {
        let Some(group_id) = group_id else {
            return Ok(vec![MemberIdentity::user(user_id)]);
        };

        let member = self
            .store
            .member_by_user(group_id, user_id)
            .await
            .map_err(|e| AppError::AudienceLookup(e.to_string()))?;

        Ok(vec![
            member
                .map(MemberIdentity::from)
                .unwrap_or_else(|| MemberIdentity::user(user_id)),
        ])
    }
}
