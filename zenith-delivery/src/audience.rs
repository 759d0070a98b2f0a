use std::sync::Arc;

use zenith_common::{Campaign, StoreError, Subscriber, SubscriberStore, internal};

/// Picks the recipients of a campaign
///
/// The result is a snapshot: subscribers who unsubscribe after the call keep
/// whatever jobs were already made for them.
#[derive(Debug, Clone)]
pub struct AudienceResolver {
    subscribers: Arc<dyn SubscriberStore>,
}

impl AudienceResolver {
    #[must_use]
    pub fn new(subscribers: Arc<dyn SubscriberStore>) -> Self {
        Self { subscribers }
    }

    /// ACTIVE subscribers, narrowed to the campaign's audience tag if it has one
    ///
    /// # Errors
    /// If the subscriber store cannot be read
    pub async fn resolve(&self, campaign: &Campaign) -> Result<Vec<Subscriber>, StoreError> {
        let audience: Vec<Subscriber> = self
            .subscribers
            .subscribers()
            .await?
            .into_iter()
            .filter(Subscriber::is_eligible)
            .filter(|subscriber| {
                campaign
                    .audience
                    .as_deref()
                    .is_none_or(|tag| subscriber.has_tag(tag))
            })
            .collect();

        internal!(
            level = DEBUG,
            campaign_id = %campaign.id,
            "Resolved audience of {} subscribers",
            audience.len()
        );

        Ok(audience)
    }
}
