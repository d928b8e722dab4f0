//! Shared doubles for the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::types::{ChatId, InlineKeyboardButtonKind, InlineKeyboardMarkup, MessageId};

use tourbot::bot::{BotContext, EventPayload, InboundEvent, SurveyAction};
use tourbot::config::SurveyRules;
use tourbot::delivery::{DeliveryChannel, DeliveryFanout};
use tourbot::errors::{DeliveryError, StoreError};
use tourbot::localization::LocalizationManager;
use tourbot::messenger::Messenger;
use tourbot::reporting::AdminService;
use tourbot::store::{
    DateRange, DestinationCount, InMemorySubmissionStore, ListQuery, NewSubmission, SubmissionAggregate,
    SubmissionRecord, SubmissionStore,
};
use tourbot::throttle::RateLimiter;

pub const OPERATOR_ID: i64 = 900;

#[derive(Debug, Clone)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
        keyboard: Option<InlineKeyboardMarkup>,
    },
    Edit {
        chat: ChatId,
        message_id: MessageId,
        text: String,
    },
    Document {
        chat: ChatId,
        bytes: Vec<u8>,
        filename: String,
        caption: String,
    },
}

/// Records every outbound call; sends to `failing_chats` fail, as do the
/// next `fail_next_sends` text sends
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    failing_chats: HashSet<i64>,
    fail_next_sends: AtomicUsize,
    next_id: AtomicI32,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chats: &[i64]) -> Self {
        Self {
            failing_chats: chats.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn fail_next_sends(&self, count: usize) {
        self.fail_next_sends.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { chat: c, text, .. } if c.0 == chat => Some(text),
                Sent::Edit { chat: c, text, .. } if c.0 == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self, chat: i64) -> String {
        self.texts_for(chat).pop().unwrap_or_default()
    }

    pub fn edits(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| matches!(sent, Sent::Edit { .. }))
            .collect()
    }

    pub fn documents(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| matches!(sent, Sent::Document { .. }))
            .collect()
    }

    /// Callback data of the buttons attached to the last text message for `chat`
    pub fn last_buttons(&self, chat: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|sent| match sent {
                Sent::Text { chat: c, keyboard, .. } if c.0 == chat => Some(keyboard),
                _ => None,
            })
            .flatten()
            .map(|keyboard| {
                keyboard
                    .inline_keyboard
                    .iter()
                    .flatten()
                    .filter_map(|button| match &button.kind {
                        InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId> {
        if self.failing_chats.contains(&chat_id.0) {
            bail!("chat {} blocked the bot", chat_id.0);
        }
        if self
            .fail_next_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bail!("network error while sending to chat {}", chat_id.0);
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat: chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit {
            chat: chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, bytes: Vec<u8>, filename: &str, caption: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Document {
            chat: chat_id,
            bytes,
            filename: filename.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

/// In-memory store whose first `failures` creates fail
pub struct FlakyStore {
    inner: InMemorySubmissionStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_creates(failures: usize) -> Self {
        Self {
            inner: InMemorySubmissionStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl SubmissionStore for FlakyStore {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.create(submission).await
    }

    async fn get(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        self.inner.delete(id).await
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.inner.list(query).await
    }

    async fn aggregate(&self, range: Option<DateRange>) -> Result<SubmissionAggregate, StoreError> {
        self.inner.aggregate(range).await
    }

    async fn top_destinations(
        &self,
        range: Option<DateRange>,
        limit: i64,
    ) -> Result<Vec<DestinationCount>, StoreError> {
        self.inner.top_destinations(range, limit).await
    }

    async fn distinct_user_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.inner.distinct_user_ids().await
    }
}

/// Channel that remembers the ids it was given
#[derive(Default)]
pub struct RecordingChannel {
    pub delivered: Mutex<Vec<i64>>,
}

impl RecordingChannel {
    pub fn ids(&self) -> Vec<i64> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, record: &SubmissionRecord) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(record.id);
        Ok(())
    }
}

/// Channel that always fails, optionally after a delay
pub struct FailingChannel {
    pub delay: Duration,
    pub attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DeliveryChannel for FailingChannel {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _record: &SubmissionRecord) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err(DeliveryError::Sheets {
            status: 503,
            body: "backend unavailable".to_string(),
        })
    }
}

pub fn context(
    messenger: Arc<RecordingMessenger>,
    store: Arc<dyn SubmissionStore>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    throttle: Duration,
) -> BotContext {
    BotContext {
        rules: SurveyRules::default(),
        i18n: Arc::new(LocalizationManager::new().unwrap()),
        limiter: Arc::new(RateLimiter::new(throttle)),
        fanout: DeliveryFanout::new(Arc::clone(&store), channels),
        admin: AdminService::new(store, OPERATOR_ID),
        messenger,
        idle_timeout: None,
    }
}

pub fn text_event(user_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        user_id,
        chat_id: ChatId(user_id),
        username: Some(format!("user{user_id}")),
        language_code: Some("ru".to_string()),
        payload: EventPayload::Text(text.to_string()),
        origin_message: None,
    }
}

pub fn action_event(user_id: i64, action: SurveyAction, origin: Option<i32>) -> InboundEvent {
    InboundEvent {
        payload: EventPayload::Action(action),
        origin_message: origin.map(MessageId),
        ..text_event(user_id, "")
    }
}

pub fn submission(user_id: i64, destination: &str, budget: i64) -> NewSubmission {
    NewSubmission {
        user_id,
        username: Some(format!("user{user_id}")),
        destination: destination.to_string(),
        departure_date: "15.07.2030".to_string(),
        nights: 7,
        adults: 2,
        children: 1,
        budget,
        comment: Some("Нет комментариев".to_string()),
    }
}

/// A departure date safely in the future, as typed by a user
pub fn future_date() -> String {
    (chrono::Utc::now().date_naive() + chrono::Duration::days(30))
        .format("%d.%m.%Y")
        .to_string()
}
