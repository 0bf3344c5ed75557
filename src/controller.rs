//! Chat panel state machine.
//!
//! One [`ChatController`] backs one chat panel (the full chat page or the
//! popup widget). It owns the conversation, the input field and the pending
//! request gate, and drives the backend. Rendering lives in `ui`; the view is
//! told to re-read state through the change callback.

use std::cell::RefCell;
use std::time::Duration;

use crate::api::{self, ChatBackend, PickedFile};
use crate::conversation::{ConversationView, Message};
use crate::session::{self, SessionStore};

pub const CHAT_FALLBACK: &str = "Sorry, something went wrong. Please try again.";
pub const CLEAR_PROMPT: &str = "Are you sure you want to clear the history?";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    pub view: ConversationView,
    pub input: String,
    /// True while a chat request is in flight; the send button is disabled.
    pub pending: bool,
    /// Bumped whenever the input field should take focus.
    pub focus_requests: u64,
    /// Bumped whenever the file control must be recreated empty.
    pub file_control_epoch: u64,
    pub confirm_prompt: Option<&'static str>,
}

pub struct ChatController<B> {
    backend: B,
    timeout: Option<Duration>,
    // never borrowed across an await
    state: RefCell<PanelState>,
    on_change: RefCell<Option<Box<dyn Fn()>>>,
}

impl<B> ChatController<B> {
    pub fn new(backend: B, timeout: Option<Duration>) -> Self {
        Self {
            backend,
            timeout,
            state: RefCell::new(PanelState::default()),
            on_change: RefCell::new(None),
        }
    }

    pub fn set_on_change(&self, on_change: impl Fn() + 'static) {
        *self.on_change.borrow_mut() = Some(Box::new(on_change));
    }

    fn update<R>(&self, f: impl FnOnce(&mut PanelState) -> R) -> R {
        let result = f(&mut self.state.borrow_mut());
        if let Some(on_change) = self.on_change.borrow().as_ref() {
            on_change();
        }
        result
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&PanelState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn snapshot(&self) -> PanelState {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.with_state(|s| s.view.messages().to_vec())
    }

    pub fn is_pending(&self) -> bool {
        self.with_state(|s| s.pending)
    }

    pub fn send_enabled(&self) -> bool {
        !self.is_pending()
    }

    pub fn typing_visible(&self) -> bool {
        self.with_state(|s| s.view.is_typing())
    }

    pub fn input(&self) -> String {
        self.with_state(|s| s.input.clone())
    }

    pub fn set_input(&self, text: String) {
        self.update(|s| s.input = text);
    }

    pub fn request_focus(&self) {
        self.update(|s| s.focus_requests += 1);
    }

    pub fn reset_file_control(&self) {
        self.update(|s| s.file_control_epoch += 1);
    }

    /// Raises the yes/no prompt; nothing is sent until it is answered.
    pub fn request_clear_history(&self) {
        self.update(|s| s.confirm_prompt = Some(CLEAR_PROMPT));
    }
}

/// Gate and typing indicator held for the lifetime of one chat request.
/// Dropping it, on any path, releases both and hands focus back.
struct ChatRequestScope<'a, B> {
    controller: &'a ChatController<B>,
}

impl<'a, B> ChatRequestScope<'a, B> {
    fn acquire(controller: &'a ChatController<B>) -> Self {
        controller.update(|s| {
            s.pending = true;
            s.view.show_typing();
        });
        Self { controller }
    }
}

impl<B> Drop for ChatRequestScope<'_, B> {
    fn drop(&mut self) {
        self.controller.update(|s| {
            s.view.hide_typing();
            s.pending = false;
            s.focus_requests += 1;
        });
    }
}

struct FileControlReset<'a, B> {
    controller: &'a ChatController<B>,
}

impl<B> Drop for FileControlReset<'_, B> {
    fn drop(&mut self) {
        self.controller.reset_file_control();
    }
}

impl<B: ChatBackend> ChatController<B> {
    /// Chat page startup: auto-submit a staged handoff query exactly once,
    /// otherwise just focus the input.
    pub async fn start(&self, store: &SessionStore) {
        match session::take_handoff(store) {
            Ok(Some(query)) => {
                tracing::info!("submitting handed-off query");
                self.submit_message(query).await;
            }
            Ok(None) => self.request_focus(),
            Err(e) => {
                tracing::error!("Failed to read handoff query: {e}");
                self.request_focus();
            }
        }
    }

    /// Sends whatever is in the input field (send button, Enter key).
    pub async fn submit_current_input(&self) {
        let text = self.input();
        self.submit_message(text).await;
    }

    pub async fn submit_message(&self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        if self.is_pending() {
            tracing::debug!("chat request already in flight, ignoring submit");
            return;
        }

        self.update(|s| {
            s.view.push(Message::user(text.clone()));
            s.input.clear();
        });
        let scope = ChatRequestScope::acquire(self);

        let reply = match api::bounded(self.timeout, self.backend.chat(&text)).await {
            Ok(reply) => {
                if !reply.sources.is_empty() {
                    tracing::debug!(sources = reply.sources.len(), "chat reply carried sources");
                }
                reply.response
            }
            Err(e) => {
                tracing::error!("Chat request failed: {e}");
                CHAT_FALLBACK.to_string()
            }
        };

        self.update(|s| {
            s.view.hide_typing();
            s.view.push(Message::assistant(reply));
        });
        drop(scope);
    }

    /// Uploads run outside the chat gate and may overlap a chat request.
    pub async fn submit_file(&self, file: Option<PickedFile>, save_to_default: bool) {
        let Some(file) = file else {
            return;
        };
        let _reset = FileControlReset { controller: self };
        let name = file.name.clone();

        self.update(|s| s.view.push(Message::user(format!("Uploading file: {name} ..."))));

        let reply = match api::bounded(self.timeout, self.backend.upload(file, save_to_default))
            .await
        {
            Ok(reply) => reply
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("File {name} uploaded.")),
            Err(e) => {
                tracing::error!("Upload of {name} failed: {e}");
                format!("Failed to upload {name}.")
            }
        };

        self.update(|s| s.view.push(Message::assistant(reply)));
    }

    /// Answers the prompt raised by [`Self::request_clear_history`].
    pub async fn answer_clear_history(&self, accepted: bool) {
        let was_asked = self.update(|s| s.confirm_prompt.take().is_some());
        if !was_asked || !accepted {
            return;
        }

        match api::bounded(self.timeout, self.backend.clear_history()).await {
            Ok(()) => self.update(|s| s.view.reset()),
            Err(e) => tracing::error!("Failed to clear history: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatReply, ContactForm, ContactReply, UploadReply};
    use crate::conversation::{Origin, GREETING};
    use crate::error::{ClientError, ClientResult};
    use async_trait::async_trait;
    use futures_util::future::join;
    use reqwest::StatusCode;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct FakeBackend {
        chat_replies: RefCell<VecDeque<ClientResult<ChatReply>>>,
        upload_replies: RefCell<VecDeque<ClientResult<UploadReply>>>,
        clear_replies: RefCell<VecDeque<ClientResult<()>>>,
        hold_chat: RefCell<Option<oneshot::Receiver<()>>>,
        chat_calls: RefCell<Vec<String>>,
        upload_calls: RefCell<Vec<(String, bool)>>,
        clear_calls: Cell<usize>,
    }

    impl FakeBackend {
        fn reply(&self, text: &str) {
            self.chat_replies.borrow_mut().push_back(Ok(ChatReply {
                response: text.to_string(),
                sources: Vec::new(),
            }));
        }

        fn fail_chat(&self, status: StatusCode) {
            self.chat_replies
                .borrow_mut()
                .push_back(Err(ClientError::Status(status)));
        }

        /// Next chat call waits until the returned sender fires or drops.
        fn hold(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.hold_chat.borrow_mut() = Some(rx);
            tx
        }
    }

    #[async_trait(?Send)]
    impl ChatBackend for Rc<FakeBackend> {
        async fn chat(&self, message: &str) -> ClientResult<ChatReply> {
            self.chat_calls.borrow_mut().push(message.to_string());
            let hold = self.hold_chat.borrow_mut().take();
            if let Some(rx) = hold {
                let _ = rx.await;
            }
            self.chat_replies.borrow_mut().pop_front().unwrap_or_else(|| {
                Ok(ChatReply {
                    response: "ok".into(),
                    sources: Vec::new(),
                })
            })
        }

        async fn upload(&self, file: PickedFile, save_to_default: bool) -> ClientResult<UploadReply> {
            self.upload_calls
                .borrow_mut()
                .push((file.name, save_to_default));
            self.upload_replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(UploadReply::default()))
        }

        async fn clear_history(&self) -> ClientResult<()> {
            self.clear_calls.set(self.clear_calls.get() + 1);
            self.clear_replies.borrow_mut().pop_front().unwrap_or(Ok(()))
        }

        async fn contact(&self, _form: &ContactForm) -> ClientResult<ContactReply> {
            unreachable!("chat panels never send the contact form")
        }
    }

    fn controller() -> (Rc<FakeBackend>, ChatController<Rc<FakeBackend>>) {
        let backend = Rc::new(FakeBackend::default());
        let controller = ChatController::new(backend.clone(), None);
        (backend, controller)
    }

    fn texts(controller: &ChatController<Rc<FakeBackend>>) -> Vec<(Origin, String)> {
        controller
            .messages()
            .into_iter()
            .map(|m| (m.origin, m.text))
            .collect()
    }

    fn report() -> PickedFile {
        PickedFile {
            name: "report.pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn reply_is_appended_after_user_message() {
        let (backend, controller) = controller();
        backend.reply("Aura is an assistant.");
        controller.set_input("What is Aura?".into());

        controller.submit_current_input().await;

        assert_eq!(
            texts(&controller),
            vec![
                (Origin::Assistant, GREETING.to_string()),
                (Origin::User, "What is Aura?".to_string()),
                (Origin::Assistant, "Aura is an assistant.".to_string()),
            ]
        );
        assert_eq!(*backend.chat_calls.borrow(), ["What is Aura?"]);
        assert_eq!(controller.input(), "");
        assert!(controller.send_enabled());
        assert!(!controller.typing_visible());
    }

    #[tokio::test]
    async fn untrimmed_text_is_sent_and_shown_literally() {
        let (backend, controller) = controller();

        controller.submit_message("  <b>hi</b>  ".into()).await;

        assert_eq!(texts(&controller)[1], (Origin::User, "  <b>hi</b>  ".to_string()));
        assert_eq!(*backend.chat_calls.borrow(), ["  <b>hi</b>  "]);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let (backend, controller) = controller();
        controller.set_input(" \n\t ".into());
        let before = controller.snapshot();

        controller.submit_current_input().await;
        controller.submit_message(String::new()).await;

        assert_eq!(controller.snapshot(), before);
        assert!(backend.chat_calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn gate_and_indicator_span_exactly_the_request() {
        let (backend, controller) = controller();
        let release = backend.hold();
        assert!(!controller.is_pending());
        assert!(!controller.typing_visible());

        let probe = async {
            tokio::task::yield_now().await;
            // user line is already there while the request is still open
            assert_eq!(texts(&controller).last().unwrap().1, "hello");
            assert!(controller.is_pending());
            assert!(!controller.send_enabled());
            assert!(controller.typing_visible());
            release.send(()).unwrap();
        };
        join(controller.submit_message("hello".into()), probe).await;

        assert!(!controller.is_pending());
        assert!(controller.send_enabled());
        assert!(!controller.typing_visible());
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_refused() {
        let (backend, controller) = controller();
        let release = backend.hold();

        let probe = async {
            tokio::task::yield_now().await;
            controller.set_input("second".into());
            controller.submit_current_input().await;
            assert_eq!(controller.input(), "second");
            release.send(()).unwrap();
        };
        join(controller.submit_message("first".into()), probe).await;

        assert_eq!(*backend.chat_calls.borrow(), ["first"]);
        let users = texts(&controller)
            .into_iter()
            .filter(|(o, _)| *o == Origin::User)
            .count();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn server_error_yields_one_fallback() {
        let (backend, controller) = controller();
        backend.fail_chat(StatusCode::INTERNAL_SERVER_ERROR);
        let focus_before = controller.snapshot().focus_requests;

        controller.submit_message("hi".into()).await;

        let messages = texts(&controller);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], (Origin::Assistant, CHAT_FALLBACK.to_string()));
        assert!(!controller.typing_visible());
        assert!(!controller.is_pending());
        assert!(controller.snapshot().focus_requests > focus_before);
    }

    #[tokio::test]
    async fn malformed_body_yields_fallback() {
        let (backend, controller) = controller();
        let bad_json = serde_json::from_str::<ChatReply>("not json").unwrap_err();
        backend
            .chat_replies
            .borrow_mut()
            .push_back(Err(ClientError::Decode(bad_json)));

        controller.submit_message("hi".into()).await;

        assert_eq!(texts(&controller).last().unwrap().1, CHAT_FALLBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_timeout_releases_the_gate() {
        let backend = Rc::new(FakeBackend::default());
        let controller = ChatController::new(backend.clone(), Some(Duration::from_secs(30)));
        let _never = backend.hold();

        controller.submit_message("anyone there?".into()).await;

        assert_eq!(texts(&controller).last().unwrap().1, CHAT_FALLBACK);
        assert!(controller.send_enabled());
    }

    #[tokio::test]
    async fn dropping_an_in_flight_request_still_cleans_up() {
        let (backend, controller) = controller();
        let _release = backend.hold();

        {
            let mut submit = Box::pin(controller.submit_message("bye".into()));
            assert!(futures_util::poll!(&mut submit).is_pending());
            assert!(controller.is_pending());
        }

        assert!(!controller.is_pending());
        assert!(!controller.typing_visible());
        assert_eq!(texts(&controller).last().unwrap().1, "bye");
    }

    #[tokio::test]
    async fn change_callback_fires_on_every_mutation() {
        let (_backend, controller) = controller();
        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        controller.set_on_change(move || counter.set(counter.get() + 1));

        controller.set_input("x".into());
        assert_eq!(changes.get(), 1);

        controller.submit_current_input().await;
        assert!(changes.get() >= 4);
    }

    #[tokio::test]
    async fn handoff_submits_once_across_page_loads() {
        let store = SessionStore::open().unwrap();
        session::stage_handoff(&store, "What is Aura?").unwrap();

        let (first_backend, first_page) = controller();
        first_page.start(&store).await;
        assert_eq!(texts(&first_page)[1], (Origin::User, "What is Aura?".to_string()));
        assert_eq!(*first_backend.chat_calls.borrow(), ["What is Aura?"]);

        let (second_backend, second_page) = controller();
        second_page.start(&store).await;
        assert!(second_backend.chat_calls.borrow().is_empty());
        assert_eq!(second_page.messages().len(), 1);
        assert_eq!(second_page.snapshot().focus_requests, 1);
    }

    #[tokio::test]
    async fn upload_prefers_server_message() {
        let (backend, controller) = controller();
        backend.upload_replies.borrow_mut().push_back(Ok(UploadReply {
            message: Some("Saved.".into()),
        }));

        controller.submit_file(Some(report()), true).await;

        let messages = texts(&controller);
        assert_eq!(
            messages[1],
            (Origin::User, "Uploading file: report.pdf ...".to_string())
        );
        assert_eq!(messages[2], (Origin::Assistant, "Saved.".to_string()));
        assert_eq!(*backend.upload_calls.borrow(), [("report.pdf".to_string(), true)]);
        assert_eq!(controller.snapshot().file_control_epoch, 1);
    }

    #[tokio::test]
    async fn upload_falls_back_to_default_confirmation() {
        let (backend, controller) = controller();
        backend.upload_replies.borrow_mut().push_back(Ok(UploadReply {
            message: Some(String::new()),
        }));

        controller.submit_file(Some(report()), false).await;

        assert_eq!(texts(&controller)[2].1, "File report.pdf uploaded.");
        assert_eq!(*backend.upload_calls.borrow(), [("report.pdf".to_string(), false)]);
    }

    #[tokio::test]
    async fn upload_failure_names_the_file_and_resets_control() {
        let (backend, controller) = controller();
        backend
            .upload_replies
            .borrow_mut()
            .push_back(Err(ClientError::Status(StatusCode::BAD_REQUEST)));

        controller.submit_file(Some(report()), true).await;

        assert_eq!(texts(&controller)[2].1, "Failed to upload report.pdf.");
        assert_eq!(controller.snapshot().file_control_epoch, 1);
    }

    #[tokio::test]
    async fn cancelled_file_selection_does_nothing() {
        let (backend, controller) = controller();
        let before = controller.snapshot();

        controller.submit_file(None, true).await;

        assert_eq!(controller.snapshot(), before);
        assert!(backend.upload_calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn upload_is_not_blocked_by_the_chat_gate() {
        let (backend, controller) = controller();
        let release = backend.hold();

        let probe = async {
            tokio::task::yield_now().await;
            controller.submit_file(Some(report()), false).await;
            assert!(controller.is_pending());
            assert_eq!(texts(&controller).last().unwrap().1, "File report.pdf uploaded.");
            release.send(()).unwrap();
        };
        join(controller.submit_message("hi".into()), probe).await;

        assert_eq!(backend.upload_calls.borrow().len(), 1);
        assert!(!controller.is_pending());
    }

    #[tokio::test]
    async fn confirmed_clear_leaves_only_the_greeting() {
        let (backend, controller) = controller();
        controller.submit_message("one".into()).await;
        controller.submit_message("two".into()).await;

        controller.request_clear_history();
        assert_eq!(controller.snapshot().confirm_prompt, Some(CLEAR_PROMPT));
        controller.answer_clear_history(true).await;

        assert_eq!(
            texts(&controller),
            vec![(Origin::Assistant, GREETING.to_string())]
        );
        assert_eq!(backend.clear_calls.get(), 1);
        assert_eq!(controller.snapshot().confirm_prompt, None);
    }

    #[tokio::test]
    async fn declined_clear_sends_nothing() {
        let (backend, controller) = controller();
        controller.submit_message("keep me".into()).await;
        let before = controller.messages();

        controller.request_clear_history();
        controller.answer_clear_history(false).await;

        assert_eq!(controller.messages(), before);
        assert_eq!(backend.clear_calls.get(), 0);
        assert_eq!(controller.snapshot().confirm_prompt, None);
    }

    #[tokio::test]
    async fn unprompted_answer_is_ignored() {
        let (backend, controller) = controller();

        controller.answer_clear_history(true).await;

        assert_eq!(backend.clear_calls.get(), 0);
    }

    #[tokio::test]
    async fn failed_clear_keeps_the_conversation() {
        let (backend, controller) = controller();
        controller.submit_message("keep me".into()).await;
        backend
            .clear_replies
            .borrow_mut()
            .push_back(Err(ClientError::Status(StatusCode::INTERNAL_SERVER_ERROR)));
        let before = controller.messages();

        controller.request_clear_history();
        controller.answer_clear_history(true).await;

        assert_eq!(controller.messages(), before);
        assert_eq!(backend.clear_calls.get(), 1);
    }

    #[tokio::test]
    async fn panels_do_not_share_state() {
        let (_a_backend, page) = controller();
        let (_b_backend, popup) = controller();

        page.submit_message("only here".into()).await;

        assert_eq!(page.messages().len(), 3);
        assert_eq!(popup.messages().len(), 1);
    }
}
