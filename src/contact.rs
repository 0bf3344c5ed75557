use std::time::Duration;

use crate::api::{self, ChatBackend, ContactForm};

pub const CONTACT_FAILURE: &str = "Something went wrong sending your message. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    /// Server acknowledgement, shown as-is; the form should be cleared.
    Sent(String),
    Failed,
}

impl ContactOutcome {
    pub fn notice(&self) -> &str {
        match self {
            ContactOutcome::Sent(message) => message,
            ContactOutcome::Failed => CONTACT_FAILURE,
        }
    }
}

pub async fn send_contact<B: ChatBackend>(
    backend: &B,
    form: &ContactForm,
    timeout: Option<Duration>,
) -> ContactOutcome {
    match api::bounded(timeout, backend.contact(form)).await {
        Ok(reply) => ContactOutcome::Sent(reply.message),
        Err(e) => {
            tracing::error!("Contact form submission failed: {e}");
            ContactOutcome::Failed
        }
    }
}
