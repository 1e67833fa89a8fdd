//! Channel resolution: push to every registered device, otherwise SMS, otherwise nothing.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use chit_common::error::AppError;
use chit_common::types::{Channel, MemberIdentity, Recipient};

use crate::store::MembershipStore;

pub struct ChannelResolver {
    store: Arc<dyn MembershipStore>,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }

    /// Resolve one member. See [`ChannelResolver::resolve_all`].
    pub async fn resolve(
        &self,
        identity: &MemberIdentity,
        sms_fallback: bool,
    ) -> Result<Channel, AppError> {
        let tokens = match identity.user_id {
            Some(user_id) => self.tokens_by_user(&[user_id]).await?.remove(&user_id),
            None => None,
        };
        self.pick(identity, tokens, sms_fallback).await
    }

    /// Resolve a whole audience with a single push-address query.
    ///
    /// Members with devices get `Push` with all their tokens. Without a device,
    /// `sms_fallback` decides between a phone lookup (profile phone, then
    /// invited phone, then member phone) and `Unreachable`.
    pub async fn resolve_all(
        &self,
        audience: Vec<MemberIdentity>,
        sms_fallback: bool,
    ) -> Result<Vec<Recipient>, AppError> {
        let user_ids: Vec<Uuid> = audience.iter().filter_map(|m| m.user_id).collect();
        let mut tokens = self.tokens_by_user(&user_ids).await?;

        let mut recipients = Vec::with_capacity(audience.len());
        for identity in audience {
            let member_tokens = identity.user_id.and_then(|id| tokens.remove(&id));
            let channel = self.pick(&identity, member_tokens, sms_fallback).await?;
            recipients.push(Recipient { identity, channel });
        }
        Ok(recipients)
    }

    async fn pick(
        &self,
        identity: &MemberIdentity,
        tokens: Option<Vec<String>>,
        sms_fallback: bool,
    ) -> Result<Channel, AppError> {
        if let Some(tokens) = tokens
            && !tokens.is_empty()
        {
            return Ok(Channel::Push(tokens));
        }
        if !sms_fallback {
            return Ok(Channel::Unreachable);
        }

        let profile_phone = match identity.user_id {
            Some(user_id) => self
                .store
                .profile_phone(user_id)
                .await
                .map_err(|e| AppError::AudienceLookup(e.to_string()))?,
            None => None,
        };

        let phone = [
            profile_phone.as_deref(),
            identity.invited_phone.as_deref(),
            identity.phone.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|p| !p.is_empty());

        Ok(match phone {
            Some(phone) => Channel::Sms(phone.to_string()),
            None => Channel::Unreachable,
        })
    }

    /// Tokens grouped by owner, deduplicated per user, in store order.
    async fn tokens_by_user(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>, AppError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let addresses = self
            .store
            .push_addresses(user_ids)
            .await
            .map_err(|e| AppError::AudienceLookup(e.to_string()))?;

        let mut by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
        for address in addresses {
            let tokens = by_user.entry(address.user_id).or_default();
            if !address.token.trim().is_empty() && !tokens.contains(&address.token) {
                tokens.push(address.token);
            }
        }
        Ok(by_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chit_common::types::ContributionStatus;

    use crate::memory::InMemoryMembershipStore;

    async fn identity(store: &InMemoryMembershipStore, group_id: Uuid, user_id: Uuid) -> MemberIdentity {
        store
            .member_by_user(group_id, user_id)
            .await
            .unwrap()
            .map(MemberIdentity::from)
            .unwrap()
    }

    #[tokio::test]
    async fn test_phone_priority_profile_then_invited_then_member() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let group_id = store.add_group("Office Circle", 5000.0, None);

        let all_three = store.add_member(group_id, "A", ContributionStatus::Pending);
        store.set_profile_phone(all_three, "+919800000001");
        store.set_member_phones(group_id, all_three, Some("+919800000002"), Some("+919800000003"));

        let invited_and_member = store.add_member(group_id, "B", ContributionStatus::Pending);
        store.set_member_phones(group_id, invited_and_member, Some("+919811111112"), Some("+919811111113"));

        let member_only = store.add_member(group_id, "C", ContributionStatus::Pending);
        store.set_member_phones(group_id, member_only, None, Some("+919822222223"));

        let nothing = store.add_member(group_id, "D", ContributionStatus::Pending);

        let resolver = ChannelResolver::new(store.clone());
        let cases = [
            (all_three, Channel::Sms("+919800000001".into())),
            (invited_and_member, Channel::Sms("+919811111112".into())),
            (member_only, Channel::Sms("+919822222223".into())),
            (nothing, Channel::Unreachable),
        ];
        for (user_id, expected) in cases {
            let identity = identity(&store, group_id, user_id).await;
            assert_eq!(resolver.resolve(&identity, true).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_phone_ignored_without_sms_fallback() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let group_id = store.add_group("Office Circle", 5000.0, None);
        let user = store.add_member(group_id, "C", ContributionStatus::Pending);
        store.set_member_phones(group_id, user, None, Some("+919822222223"));

        let resolver = ChannelResolver::new(store.clone());
        let identity = identity(&store, group_id, user).await;
        assert_eq!(resolver.resolve(&identity, false).await.unwrap(), Channel::Unreachable);
    }

    #[tokio::test]
    async fn test_devices_win_over_phone_and_duplicates_collapse() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let group_id = store.add_group("Office Circle", 5000.0, None);
        let user = store.add_member(group_id, "A", ContributionStatus::Pending);
        store.set_profile_phone(user, "+919800000001");
        store.add_push_token(user, "tok-phone");
        store.add_push_token(user, "tok-tablet");
        store.add_push_token(user, "tok-phone");

        let resolver = ChannelResolver::new(store.clone());
        let identity = identity(&store, group_id, user).await;
        assert_eq!(
            resolver.resolve(&identity, true).await.unwrap(),
            Channel::Push(vec!["tok-phone".into(), "tok-tablet".into()])
        );
    }
}
