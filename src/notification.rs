//! Operator notification channel.

use async_trait::async_trait;
use std::sync::Arc;
use teloxide::types::ChatId;

use crate::bot::ui_builder::format_amount;
use crate::delivery::DeliveryChannel;
use crate::errors::DeliveryError;
use crate::export::format_created_at;
use crate::localization::LocalizationManager;
use crate::messenger::Messenger;
use crate::store::SubmissionRecord;

/// Sends a summary of every new request to the operator chat
pub struct OperatorNotifier {
    messenger: Arc<dyn Messenger>,
    i18n: Arc<LocalizationManager>,
    operator_chat: ChatId,
    language: String,
}

impl OperatorNotifier {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        i18n: Arc<LocalizationManager>,
        operator_chat: ChatId,
        language: impl Into<String>,
    ) -> Self {
        Self {
            messenger,
            i18n,
            operator_chat,
            language: language.into(),
        }
    }

    pub fn render(&self, record: &SubmissionRecord) -> String {
        let request_id = record.id.to_string();
        let user_id = record.user_id.to_string();
        let nights = record.nights.to_string();
        let adults = record.adults.to_string();
        let children = record.children.to_string();
        let budget = format_amount(record.budget);
        let created_at = format_created_at(record.created_at);

        self.i18n.t_args(
            "notify-new-request",
            &self.language,
            &[
                ("request_id", request_id.as_str()),
                ("username", record.username.as_deref().unwrap_or("N/A")),
                ("user_id", user_id.as_str()),
                ("destination", record.destination.as_str()),
                ("date", record.departure_date.as_str()),
                ("nights", nights.as_str()),
                ("adults", adults.as_str()),
                ("children", children.as_str()),
                ("budget", budget.as_str()),
                ("comment", record.comment.as_deref().unwrap_or("-")),
                ("created_at", created_at.as_str()),
            ],
        )
    }
}

#[async_trait]
impl DeliveryChannel for OperatorNotifier {
    fn name(&self) -> &'static str {
        "operator_notification"
    }

    async fn deliver(&self, record: &SubmissionRecord) -> Result<(), DeliveryError> {
        let text = self.render(record);
        self.messenger
            .send_text(self.operator_chat, &text, None)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::Notification(e.to_string()))
    }
}
