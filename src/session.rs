//! Session Store
//!
//! Per-identity state for the guided `/addpanel` dialog. Sessions live only
//! in memory; losing them on restart is acceptable. The router only
//! advances a session for messages sent in the identity's own private
//! chat, so a group chat can never hijack someone else's dialog.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Domain,
    Plta,
    Pltc,
}

#[derive(Debug)]
struct Session {
    step: Step,
    domain: Option<String>,
    plta: Option<String>,
}

/// Collected panel connection data emitted on session completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelDraft {
    pub domain: String,
    pub plta: String,
    pub pltc: String,
}

/// Result of feeding one message into an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Domain stored, prompt for the application API key.
    NeedPlta,
    /// Application key stored, prompt for the client API key.
    NeedPltc,
    Complete(PanelDraft),
}

#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh session, discarding any prior one for this identity.
    pub fn begin(&self, identity: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(
            identity,
            Session {
                step: Step::Domain,
                domain: None,
                plta: None,
            },
        );
    }

    pub fn has_session(&self, identity: i64) -> bool {
        self.inner.lock().unwrap().contains_key(&identity)
    }

    /// Feed one free-text message into the identity's session. Returns
    /// `None` when no session is open. The session is removed on
    /// completion; other identities' sessions are untouched.
    pub fn advance(&self, identity: i64, input: &str) -> Option<SessionOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.get_mut(&identity)?;
        let input = input.trim().to_string();

        match session.step {
            Step::Domain => {
                session.domain = Some(input);
                session.step = Step::Plta;
                Some(SessionOutcome::NeedPlta)
            }
            Step::Plta => {
                session.plta = Some(input);
                session.step = Step::Pltc;
                Some(SessionOutcome::NeedPltc)
            }
            Step::Pltc => {
                let session = inner.remove(&identity)?;
                Some(SessionOutcome::Complete(PanelDraft {
                    domain: session.domain.unwrap_or_default(),
                    plta: session.plta.unwrap_or_default(),
                    pltc: input,
                }))
            }
        }
    }
}
