//! Top-level handling of one inbound event.
//!
//! Every event is classified on its own: checkout queries are approved,
//! payments are counted, and chat messages go through stats, the working
//! placeholder, the subscription gate and finally the command grammar.
//! Errors are handled where they happen; `handle` always acknowledges.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::access::{AccessPolicy, AccessTier};
use crate::broadcast::{BroadcastEngine, BroadcastJob, Partition};
use crate::catalog::{Catalog, ContentKind, Locale};
use crate::commands::{self, Command};
use crate::config::{Config, ContactLink, PricesConfig};
use crate::delivery::{personalize_caption, DeliveryEngine, DeliveryReceipt, DeliveryRequest};
use crate::error::{Error, Result};
use crate::events::{ChatMessage, InboundEvent, PaymentConfirmation, PreCheckoutQuery, Sender};
use crate::platform::{ChatApi, Keyboard, UrlButton};
use crate::registry::{NewUser, Registry, RegistryError, StatField};
use crate::scheduler::{RetractionKey, RetractionScheduler};
use crate::texts;

/// Transport-level outcome. Only unparseable input is reported as a failure,
/// so the platform never redelivers an update we already acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Malformed,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub admin_id: i64,
    pub channel_id: i64,
    pub channel_link: String,
    pub contact_links: Vec<ContactLink>,
    pub prices: PricesConfig,
    pub retraction_delay: Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admin_id: config.telegram.admin_user_id,
            channel_id: config.telegram.channel_id,
            channel_link: config.telegram.channel_link.clone(),
            contact_links: config.telegram.contact_links.clone(),
            prices: config.prices.clone(),
            retraction_delay: config.cleanup.retraction_delay(),
        }
    }
}

pub struct CommandDispatcher {
    api: Arc<dyn ChatApi>,
    access: AccessPolicy,
    delivery: DeliveryEngine,
    broadcast: BroadcastEngine,
    retractions: RetractionScheduler,
    registry: Registry,
    catalog: Arc<Catalog>,
    settings: DispatcherSettings,
}

impl CommandDispatcher {
    pub fn new(
        settings: DispatcherSettings,
        api: Arc<dyn ChatApi>,
        registry: Registry,
        catalog: Arc<Catalog>,
        retractions: RetractionScheduler,
    ) -> Self {
        Self {
            access: AccessPolicy::new(settings.admin_id, settings.channel_id, Arc::clone(&api)),
            delivery: DeliveryEngine::new(Arc::clone(&api), settings.prices.clone()),
            broadcast: BroadcastEngine::new(Arc::clone(&api), registry.clone()),
            api,
            retractions,
            registry,
            catalog,
            settings,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn handle(&self, event: InboundEvent) -> Ack {
        match event {
            InboundEvent::PreCheckoutQuery(query) => self.approve_checkout(&query).await,
            InboundEvent::ChatMessage(message) => self.handle_message(&message).await,
            InboundEvent::Other => debug!("Ignoring update without message"),
        }
        Ack::Ok
    }

    /// Prices are fixed when the paid media is sent, so every checkout is approved.
    async fn approve_checkout(&self, query: &PreCheckoutQuery) {
        info!(
            "Approving checkout {} from user {} ({} {})",
            query.id, query.sender_id, query.total_amount, query.currency
        );
        if let Err(e) = self.api.answer_pre_checkout_query(&query.id, true).await {
            error!("Failed to answer checkout {}: {}", query.id, e);
        }
    }

    async fn handle_message(&self, message: &ChatMessage) {
        // A payment confirmation ends processing whatever the text says.
        if let Some(payment) = &message.payment {
            self.record_payment(&message.sender, payment).await;
            return;
        }

        self.record_interaction(&message.sender).await;

        let placeholder = self.show_placeholder(message.chat_id).await;
        self.route(message).await;
        self.clear_placeholder(message.chat_id, placeholder).await;
    }

    async fn record_payment(&self, sender: &Sender, payment: &PaymentConfirmation) {
        info!(
            "Payment received: {} {} from user {} ({})",
            payment.total_amount, payment.currency, sender.id, payment.payload
        );
        match self
            .registry
            .increment(StatField::StarsEarned, payment.total_amount)
            .await
        {
            Ok(()) => {}
            Err(RegistryError::NotConfigured) => debug!("Registry not configured, payment not recorded"),
            Err(e) => warn!("Failed to record payment in stats: {}", e),
        }
    }

    async fn record_interaction(&self, sender: &Sender) {
        if !self.registry.is_configured() {
            return;
        }
        if let Err(e) = self.registry.increment(StatField::Interactions, 1).await {
            warn!("Failed to record interaction: {}", e);
        }
        let user = NewUser {
            id: sender.id,
            username: sender.username.clone(),
            first_name: Some(sender.display_name.clone()),
            last_name: sender.last_name.clone(),
            locale: sender.locale(),
        };
        match self.registry.upsert_user(&user).await {
            Ok(true) => info!("New user registered: {}", sender.id),
            Ok(false) => {}
            Err(e) => warn!("Failed to save user {}: {}", sender.id, e),
        }
    }

    async fn show_placeholder(&self, chat_id: i64) -> Option<i64> {
        match self
            .api
            .send_text(chat_id, texts::WORKING_PLACEHOLDER, None)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to send placeholder to {}: {}", chat_id, e);
                None
            }
        }
    }

    async fn clear_placeholder(&self, chat_id: i64, placeholder: Option<i64>) {
        if let Some(message_id) = placeholder {
            if let Err(e) = self.api.delete_message(chat_id, message_id).await {
                warn!("Failed to delete placeholder in {}: {}", chat_id, e);
            }
        }
    }

    async fn route(&self, message: &ChatMessage) {
        let sender = &message.sender;
        let locale = sender.locale();
        let is_admin = self.access.is_admin(sender.id);

        let command = commands::parse(&message.text, is_admin);
        if command.is_admin_only() {
            info!("Admin command from {}: {:?}", sender.id, command);
        }
        if command == Command::Start {
            self.handle_start(message.chat_id, locale, is_admin).await;
            return;
        }

        let tier = self.access.resolve_tier(sender.id).await;
        if tier == AccessTier::RegularUnsubscribed {
            info!("User {} is not subscribed, sending channel prompt", sender.id);
            self.send_subscription_prompt(message.chat_id, locale).await;
            return;
        }

        match command {
            Command::Broadcast { partition, body } => {
                self.handle_broadcast(message.chat_id, partition, body).await
            }
            Command::SendAdvertisement { test_only } => {
                self.handle_advertisement(message.chat_id, test_only).await
            }
            Command::Content(kind) => {
                let request = DeliveryRequest {
                    recipient: message.chat_id,
                    kind,
                    locale,
                    tier,
                };
                self.handle_content(&request, message).await
            }
            Command::Start => {}
        }
    }

    async fn handle_start(&self, chat_id: i64, locale: Locale, is_admin: bool) {
        self.reply(chat_id, self.catalog.start_message(locale), None)
            .await;
        if is_admin {
            let info = texts::admin_info(&self.settings.prices, self.registry.is_configured());
            self.reply(chat_id, &info, None).await;
        }
    }

    async fn send_subscription_prompt(&self, chat_id: i64, locale: Locale) {
        let keyboard = vec![vec![UrlButton::new(
            texts::CHANNEL_BUTTON,
            &self.settings.channel_link,
        )]];
        self.reply(chat_id, texts::subscription_required(locale), Some(keyboard))
            .await;
    }

    async fn handle_broadcast(&self, requester: i64, partition: Partition, body: String) {
        let job = BroadcastJob {
            partition,
            body,
            requester,
        };
        let reply = match self.broadcast.broadcast(&job).await {
            Ok(report) => texts::broadcast_report(partition.label(), &report),
            Err(RegistryError::NotConfigured) => {
                texts::REGISTRY_NOT_CONFIGURED_BROADCAST.to_string()
            }
            Err(e) => {
                error!("Broadcast to {} aborted: {:#}", partition.label(), e);
                texts::broadcast_failed(&e.to_string())
            }
        };
        self.reply(requester, &reply, None).await;
    }

    async fn handle_advertisement(&self, requester: i64, test_only: bool) {
        let Some(ad) = self.catalog.advertisement.as_ref() else {
            self.reply(requester, texts::ADVERTISEMENT_MISSING, None)
                .await;
            return;
        };

        match self
            .broadcast
            .send_advertisement(requester, ad, test_only)
            .await
        {
            Ok(Some(report)) => {
                self.reply(requester, &texts::advertisement_report(&report), None)
                    .await
            }
            Ok(None) => {}
            Err(RegistryError::NotConfigured) => {
                self.reply(requester, texts::REGISTRY_NOT_CONFIGURED_ADVERTISEMENT, None)
                    .await
            }
            Err(e) => {
                error!("Advertisement aborted: {:#}", e);
                self.reply(requester, &texts::broadcast_failed(&e.to_string()), None)
                    .await
            }
        }
    }

    async fn handle_content(&self, request: &DeliveryRequest, message: &ChatMessage) {
        match self
            .deliver(request, &message.sender.display_name)
            .await
        {
            Ok(receipt) => {
                if let Some(message_id) = receipt.delivered_message_id {
                    self.retractions
                        .schedule(
                            RetractionKey::new(request.recipient, message_id),
                            self.settings.retraction_delay,
                        )
                        .await;
                }
            }
            Err(e) => {
                error!("Error sending content to {}: {}", request.recipient, e);
                self.send_delivery_error(request.recipient, request.locale)
                    .await;
                self.notify_admin(
                    "Failed to send content",
                    json!({
                        "chatId": request.recipient,
                        "messageText": message.text,
                        "error": e.to_string(),
                    }),
                )
                .await;
            }
        }
    }

    /// Pick an asset and caption from the catalog and hand them to the engine.
    async fn deliver(&self, request: &DeliveryRequest, first_name: &str) -> Result<DeliveryReceipt> {
        let (asset, caption) = {
            let mut rng = rand::thread_rng();
            let asset = self
                .catalog
                .pick_asset(request.kind, request.locale, &mut rng)
                .map(str::to_string);
            let caption = self
                .catalog
                .pick_caption(request.locale, &mut rng)
                .unwrap_or_default()
                .to_string();
            (asset, caption)
        };
        let asset = asset.ok_or(Error::ConfigurationUnavailable("content catalog"))?;

        let caption = match request.kind {
            ContentKind::Audio => caption,
            ContentKind::Photo | ContentKind::Video => {
                personalize_caption(&caption, Some(first_name))
            }
        };

        self.delivery
            .deliver(request.recipient, request.kind, &asset, &caption, request.tier)
            .await
    }

    async fn send_delivery_error(&self, chat_id: i64, locale: Locale) {
        let mut keyboard: Keyboard = self
            .settings
            .contact_links
            .iter()
            .map(|link| vec![UrlButton::new(&link.label, &link.url)])
            .collect();
        keyboard.push(vec![UrlButton::new(
            "📱 Telegram",
            &self.settings.channel_link,
        )]);
        self.reply(chat_id, texts::delivery_error(locale), Some(keyboard))
            .await;
    }

    async fn notify_admin(&self, error: &str, context: serde_json::Value) {
        let report = texts::admin_error_report(error, &context);
        if let Err(e) = self
            .api
            .send_text(self.settings.admin_id, &report, None)
            .await
        {
            error!("Failed to notify admin: {}", e);
        }
    }

    async fn reply(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) {
        if let Err(e) = self.api.send_text(chat_id, text, keyboard).await {
            warn!("Failed to reply to {}: {}", chat_id, e);
        }
    }
}
