//! Outbound chat capability.
//!
//! The survey flow, the operator notifier and the broadcast command talk to
//! users only through [`Messenger`]. The production implementation is the
//! teloxide [`Bot`]; tests substitute a recording double.

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, MessageId};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, optionally with an inline keyboard
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId>;

    /// Replace the text (and keyboard) of a message sent earlier
    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()>;

    async fn send_document(&self, chat_id: ChatId, bytes: Vec<u8>, filename: &str, caption: &str) -> Result<()>;
}

#[async_trait]
impl Messenger for Bot {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageId> {
        let mut request = self.send_message(chat_id, text.to_string());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        let sent = request.await?;
        Ok(sent.id)
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let mut request = self.edit_message_text(chat_id, message_id, text.to_string());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: ChatId, bytes: Vec<u8>, filename: &str, caption: &str) -> Result<()> {
        let document = InputFile::memory(bytes).file_name(filename.to_string());
        Requester::send_document(self, chat_id, document)
            .caption(caption.to_string())
            .await?;
        Ok(())
    }
}
