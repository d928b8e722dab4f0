mod common;

use std::sync::Arc;
use std::time::Duration;
use tourbot::bot::{handle_event, BotContext, EventPayload, InboundEvent, SurveyAction};
use tourbot::delivery::DeliveryChannel;
use tourbot::dialogue::ConversationState;
use tourbot::store::{InMemorySubmissionStore, ListQuery, SubmissionStore};
use tourbot::survey::SurveyStep;

use common::{action_event, context, future_date, text_event, FlakyStore, RecordingMessenger, Sent, OPERATOR_ID};

const USER: i64 = 77;

struct Harness {
    ctx: BotContext,
    messenger: Arc<RecordingMessenger>,
    store: Arc<dyn SubmissionStore>,
    state: ConversationState,
}

impl Harness {
    fn with_store(store: Arc<dyn SubmissionStore>, throttle: Duration) -> Self {
        let messenger = Arc::new(RecordingMessenger::new());
        let ctx = context(messenger.clone(), store.clone(), Vec::<Arc<dyn DeliveryChannel>>::new(), throttle);
        Self {
            ctx,
            messenger,
            store,
            state: ConversationState::Idle,
        }
    }

    fn new() -> Self {
        Self::with_store(Arc::new(InMemorySubmissionStore::new()), Duration::ZERO)
    }

    async fn send(&mut self, event: InboundEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = handle_event(&self.ctx, state, &event).await.unwrap();
    }

    async fn text(&mut self, text: &str) {
        self.send(text_event(USER, text)).await;
    }

    async fn press(&mut self, action: SurveyAction) {
        self.send(action_event(USER, action, Some(500))).await;
    }

    fn step(&self) -> Option<SurveyStep> {
        match &self.state {
            ConversationState::Survey(session) => Some(session.step()),
            _ => None,
        }
    }

    async fn fill_until_comment(&mut self) {
        self.press(SurveyAction::Begin).await;
        for answer in ["Турция", future_date().as_str(), "7", "2", "0", "150 000"] {
            self.text(answer).await;
        }
        assert_eq!(self.step(), Some(SurveyStep::Comment));
    }
}

#[tokio::test]
async fn test_start_shows_welcome_menu() {
    let mut harness = Harness::new();
    harness.text("/start").await;

    assert!(harness.state.is_idle());
    assert!(harness.messenger.last_text(USER).contains("TourBot"));
    assert_eq!(harness.messenger.last_buttons(USER), vec!["start_survey"]);
}

#[tokio::test]
async fn test_full_survey_is_persisted_and_confirmed() {
    let mut harness = Harness::new();
    harness.fill_until_comment().await;
    harness.text("Хочу отель у моря").await;

    assert!(harness.state.is_idle());
    let records = harness.store.list(ListQuery::all()).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.user_id, USER);
    assert_eq!(record.username.as_deref(), Some("user77"));
    assert_eq!(record.destination, "Турция");
    assert_eq!(record.departure_date, future_date());
    assert_eq!(record.budget, 150_000);
    assert_eq!(record.comment.as_deref(), Some("Хочу отель у моря"));

    let confirmation = harness.messenger.last_text(USER);
    assert!(confirmation.contains(&format!("#{}", record.id)));
    assert!(confirmation.contains("150 000"));
}

#[tokio::test]
async fn test_each_answer_is_confirmed_with_progress() {
    let mut harness = Harness::new();
    harness.press(SurveyAction::Begin).await;
    assert!(harness.messenger.last_text(USER).contains("1 из 7"));

    harness.text("Грузия").await;
    let reply = harness.messenger.last_text(USER);
    assert!(reply.contains("Грузия"));
    assert!(reply.contains("2 из 7"));
    assert_eq!(harness.messenger.last_buttons(USER), vec!["back"]);
}

#[tokio::test]
async fn test_invalid_answer_is_rejected_with_step_message() {
    let mut harness = Harness::new();
    harness.press(SurveyAction::Begin).await;
    harness.text("Кипр").await;
    harness.text(&future_date()).await;

    harness.text("30").await;
    assert_eq!(harness.step(), Some(SurveyStep::Nights));
    let reply = harness.messenger.last_text(USER);
    assert!(reply.contains('3') && reply.contains("21"), "unexpected reply: {reply}");
}

#[tokio::test]
async fn test_skip_comment_stores_sentinel() {
    let mut harness = Harness::new();
    harness.fill_until_comment().await;
    assert_eq!(harness.messenger.last_buttons(USER), vec!["skip", "back"]);

    harness.press(SurveyAction::Skip).await;
    let records = harness.store.list(ListQuery::all()).await.unwrap();
    assert_eq!(records[0].comment.as_deref(), Some("Нет комментариев"));
}

#[tokio::test]
async fn test_back_edits_button_message_and_keeps_answers() {
    let mut harness = Harness::new();
    harness.press(SurveyAction::Begin).await;
    harness.text("Мальдивы").await;

    harness.press(SurveyAction::Back).await;
    assert_eq!(harness.step(), Some(SurveyStep::Destination));
    match harness.messenger.edits().last() {
        Some(Sent::Edit { message_id, .. }) => assert_eq!(message_id.0, 500),
        other => panic!("expected an edit, got {other:?}"),
    }
    match &harness.state {
        ConversationState::Survey(session) => {
            assert_eq!(session.answers().destination.as_deref(), Some("Мальдивы"))
        }
        other => panic!("unexpected state {other:?}"),
    }

    // Back from the first question leaves the survey
    harness.press(SurveyAction::Back).await;
    assert!(harness.state.is_idle());
}

#[tokio::test]
async fn test_persistence_failure_offers_retry() {
    let mut harness = Harness::with_store(Arc::new(FlakyStore::failing_creates(1)), Duration::ZERO);
    harness.fill_until_comment().await;

    harness.text("Без пересадок").await;
    assert_eq!(harness.step(), Some(SurveyStep::Comment));
    assert_eq!(harness.messenger.last_buttons(USER), vec!["retry", "back"]);
    assert!(harness.store.list(ListQuery::all()).await.unwrap().is_empty());

    harness.press(SurveyAction::Retry).await;
    assert!(harness.state.is_idle());
    let records = harness.store.list(ListQuery::all()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].comment.as_deref(), Some("Без пересадок"));
}

#[tokio::test]
async fn test_lost_confirmation_still_completes_survey() {
    let mut harness = Harness::new();
    harness.fill_until_comment().await;

    harness.messenger.fail_next_sends(1);
    harness.press(SurveyAction::Skip).await;
    assert!(harness.state.is_idle());

    // A second press on the old skip button must not store the request again
    harness.press(SurveyAction::Skip).await;
    assert!(harness.state.is_idle());
    let records = harness.store.list(ListQuery::all()).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_retry_after_stepping_back_repeats_current_prompt() {
    let mut harness = Harness::with_store(Arc::new(FlakyStore::failing_creates(1)), Duration::ZERO);
    harness.fill_until_comment().await;
    harness.text("Без пересадок").await;

    harness.press(SurveyAction::Back).await;
    assert_eq!(harness.step(), Some(SurveyStep::Budget));
    let edits_before = harness.messenger.edits().len();

    harness.press(SurveyAction::Retry).await;
    assert_eq!(harness.step(), Some(SurveyStep::Budget));
    let edits = harness.messenger.edits();
    assert_eq!(edits.len(), edits_before + 1);
    match edits.last() {
        Some(Sent::Edit { text, .. }) => assert!(text.contains("Какой бюджет")),
        other => panic!("expected an edit, got {other:?}"),
    }
    assert!(harness.store.list(ListQuery::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_message_inside_window_is_throttled() {
    let mut harness = Harness::with_store(Arc::new(InMemorySubmissionStore::new()), Duration::from_secs(10));
    harness.state = ConversationState::Survey(tourbot::survey::SurveySession::new(chrono::Utc::now()));

    harness.text("Турция").await;
    harness.text("Египет").await;

    assert_eq!(harness.step(), Some(SurveyStep::DepartureDate));
    match &harness.state {
        ConversationState::Survey(session) => assert_eq!(session.answers().destination.as_deref(), Some("Турция")),
        other => panic!("unexpected state {other:?}"),
    }
    let reply = harness.messenger.last_text(USER);
    assert!(reply.contains("Подождите"), "unexpected reply: {reply}");
    assert!(reply.contains("10.0") || reply.contains("9.9"), "unexpected reply: {reply}");

    // Buttons are never throttled
    harness.press(SurveyAction::Back).await;
    assert_eq!(harness.step(), Some(SurveyStep::Destination));
}

#[tokio::test]
async fn test_non_text_message_reprompts() {
    let mut harness = Harness::new();
    harness.press(SurveyAction::Begin).await;
    harness
        .send(InboundEvent {
            payload: EventPayload::Unsupported,
            ..text_event(USER, "")
        })
        .await;

    assert_eq!(harness.step(), Some(SurveyStep::Destination));
    assert!(harness.messenger.last_text(USER).contains("текстовым"));
}

#[tokio::test]
async fn test_cancel_discards_survey() {
    let mut harness = Harness::new();
    harness.press(SurveyAction::Begin).await;
    harness.text("Вьетнам").await;
    harness.text("/cancel").await;

    assert!(harness.state.is_idle());
    assert_eq!(harness.messenger.last_buttons(USER), vec!["start_survey"]);
}

#[tokio::test]
async fn test_idle_survey_expires() {
    let mut harness = Harness::new();
    harness.ctx.idle_timeout = Some(Duration::from_secs(60));
    let stale = chrono::Utc::now() - chrono::Duration::minutes(5);
    harness.state = ConversationState::Survey(tourbot::survey::SurveySession::new(stale));

    harness.text("Турция").await;
    assert!(harness.state.is_idle());
    assert_eq!(harness.messenger.last_buttons(USER), vec!["start_survey"]);
}

#[tokio::test]
async fn test_english_users_get_english_replies() {
    let mut harness = Harness::new();
    harness
        .send(InboundEvent {
            language_code: Some("en-US".to_string()),
            ..text_event(USER, "/start")
        })
        .await;
    assert!(harness.messenger.last_text(USER).contains("Welcome"));
}

#[tokio::test]
async fn test_admin_commands_are_operator_only() {
    let mut harness = Harness::new();
    harness.text("/stats").await;
    assert!(harness.messenger.last_text(USER).contains("нет доступа"));

    harness.send(text_event(OPERATOR_ID, "/stats")).await;
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("Всего заявок: 0"));
}

#[tokio::test]
async fn test_admin_search_delete_and_export() {
    let mut harness = Harness::new();
    harness.fill_until_comment().await;
    harness.press(SurveyAction::Skip).await;

    harness.send(text_event(OPERATOR_ID, "/search 1")).await;
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("Турция"));

    harness.send(text_event(OPERATOR_ID, "/search 99")).await;
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("#99"));

    harness.send(text_event(OPERATOR_ID, "/search abc")).await;
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("/search ID"));

    harness.send(text_event(OPERATOR_ID, "/export")).await;
    match harness.messenger.documents().last() {
        Some(Sent::Document { filename, caption, .. }) => {
            assert!(filename.starts_with("requests_") && filename.ends_with(".csv"));
            assert!(caption.contains('1'));
        }
        other => panic!("expected a document, got {other:?}"),
    }

    harness.send(text_event(OPERATOR_ID, "/delete 1")).await;
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("удалена"));
    assert!(harness.store.list(ListQuery::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broadcast_waits_for_text_and_can_be_cancelled() {
    let mut harness = Harness::new();
    harness.fill_until_comment().await;
    harness.press(SurveyAction::Skip).await;

    harness.send(text_event(OPERATOR_ID, "/broadcast")).await;
    assert_eq!(harness.state, ConversationState::AwaitingBroadcast);
    harness.send(text_event(OPERATOR_ID, "/cancel")).await;
    assert!(harness.state.is_idle());
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("отменена"));

    harness.send(text_event(OPERATOR_ID, "/broadcast")).await;
    harness.send(text_event(OPERATOR_ID, "Скидка 10% до пятницы")).await;
    assert!(harness.state.is_idle());
    assert_eq!(harness.messenger.last_text(USER), "Скидка 10% до пятницы");
    assert!(harness.messenger.last_text(OPERATOR_ID).contains("Успешно: 1"));
}
