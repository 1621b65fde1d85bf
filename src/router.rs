//! Event Classifier & Router
//!
//! The single inbound handler. Every protocol event is classified by
//! direction, then routed through a fixed-order dispatch: translation
//! toggles and outgoing edits on one side; tracked-target forwarding,
//! panel commands and the guided setup session on the other.
//!
//! Handlers convert their own failures into chat replies. Anything that
//! still escapes is caught by `handle_event`, logged in full, and
//! forwarded to the operator; no event may stop the loop.

use crate::access::AccessStore;
use crate::commands::{self, Command, ToggleScope};
use crate::error::{BotError, Result};
use crate::gateway::{Gateway, InboundEvent, SendOptions};
use crate::masking;
use crate::panel::{PanelClient, PanelStore, PanelTarget, Provisioner, ServerSize, ServerSpec};
use crate::session::{SessionOutcome, SessionStore};
use crate::translation::TranslationStore;
use crate::translator::Translator;
use crate::util;
use std::sync::Arc;

const ERROR_CHUNK: usize = 4000;

const TOGGLE_USAGE: &str =
    "Usage:\n/terjemahan on\n/terjemahan off\n/terjemahan local on\n/terjemahan local off";

pub struct Router {
    gateway: Arc<dyn Gateway>,
    translator: Arc<dyn Translator>,
    access: AccessStore,
    sessions: SessionStore,
    translation: TranslationStore,
    panel_store: PanelStore,
    provisioner: Option<Arc<dyn Provisioner>>,
    http: reqwest::Client,
    owner_id: i64,
    source_lang: String,
    target_lang: String,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn Gateway>,
        translator: Arc<dyn Translator>,
        access: AccessStore,
        translation: TranslationStore,
        panel_store: PanelStore,
        owner_id: i64,
        source_lang: String,
        target_lang: String,
    ) -> Self {
        Self {
            gateway,
            translator,
            access,
            sessions: SessionStore::new(),
            translation,
            panel_store,
            provisioner: None,
            http: reqwest::Client::new(),
            owner_id,
            source_lang,
            target_lang,
        }
    }

    pub fn translation_store(&self) -> &TranslationStore {
        &self.translation
    }

    /// Replace the provisioning backend, so dispatch can be exercised
    /// against a stub. The default builds a live `PanelClient` from the
    /// stored profile on every use, which is what makes a re-run of
    /// `/addpanel` take effect immediately.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Top-level wrapper. Never returns an error; unexpected failures go
    /// to the log and to the operator's private chat, chunked.
    pub async fn handle_event(&self, event: InboundEvent) {
        tracing::debug!(
            chat = event.chat_id,
            sender = event.sender_id,
            outgoing = event.outgoing,
            "event"
        );
        let result = if event.outgoing {
            self.handle_outgoing(&event).await
        } else {
            self.handle_incoming(&event).await
        };
        if let Err(e) = result {
            tracing::error!("event handler error: {}", e);
            self.report_error(&e).await;
        }
    }

    async fn report_error(&self, err: &BotError) {
        let report = format!(
            "ERROR REPORT\n{}\n\n{}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            err
        );
        for (i, chunk) in util::chunk_text(&report, ERROR_CHUNK).into_iter().enumerate() {
            if let Err(e) = self
                .gateway
                .send(self.owner_id, &chunk, SendOptions::default())
                .await
            {
                tracing::warn!("failed to deliver error report part {}: {}", i + 1, e);
                break;
            }
        }
    }

    async fn reply(&self, event: &InboundEvent, text: &str) -> Result<()> {
        self.gateway
            .send(event.chat_id, text, SendOptions::default())
            .await
    }

    /// Chat-visible rendering of an expected failure. Remote causes stay
    /// in the log; the requester only sees a short generic line.
    fn user_message(err: &BotError) -> String {
        match err {
            BotError::NotConfigured => "Panel is not configured. Run /addpanel first.".to_string(),
            BotError::Unauthorized => "You have no access!".to_string(),
            BotError::Validation(usage) => usage.clone(),
            BotError::Resolution(ident) => format!("Could not resolve `{}`.", ident),
            BotError::Remote(_) => "Remote call failed.".to_string(),
            BotError::Delivery(_) => "Recipient unreachable.".to_string(),
            BotError::Persistence(_) => "Could not save the change.".to_string(),
        }
    }

    async fn reject(&self, event: &InboundEvent, err: BotError) -> Result<()> {
        self.reply(event, &Self::user_message(&err)).await
    }

    async fn reply_html(&self, event: &InboundEvent, text: &str) -> Result<()> {
        self.gateway
            .send(event.chat_id, text, SendOptions::html())
            .await
    }

    // ---------- Outgoing ----------

    async fn handle_outgoing(&self, event: &InboundEvent) -> Result<()> {
        // The toggle command wins over everything else on the outgoing
        // side, including an enabled translation mode.
        if let Some(Command::TranslateToggle(scope)) = commands::parse(&event.text) {
            return self.toggle_translation(event, scope).await;
        }

        if !self.translation.is_enabled_for(event.chat_id) {
            return Ok(());
        }
        if event.text.trim_start().starts_with('/') {
            // Other commands are never translated or edited.
            return Ok(());
        }

        let (masked, entries) = masking::mask(&event.text);
        let translated = match self
            .translator
            .translate(&masked, Some(&self.source_lang), &self.target_lang)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("outgoing translation failed: {}", e);
                return Ok(());
            }
        };
        let final_text = masking::restore(&translated, &entries);

        if let Err(e) = self
            .gateway
            .edit(event.chat_id, event.message_id, &final_text)
            .await
        {
            tracing::warn!("edit failed, falling back to reply: {}", e);
            self.gateway
                .send(
                    event.chat_id,
                    &final_text,
                    SendOptions::reply_to(event.message_id),
                )
                .await?;
        }
        Ok(())
    }

    async fn toggle_translation(&self, event: &InboundEvent, scope: ToggleScope) -> Result<()> {
        let reply = match scope {
            ToggleScope::GlobalOn => {
                self.translation.set_global(true)?;
                format!(
                    "Translation GLOBAL ON: every outgoing message will be translated ({} -> {}).",
                    self.source_lang, self.target_lang
                )
            }
            ToggleScope::GlobalOff => {
                self.translation.set_global(false)?;
                "Translation GLOBAL OFF.".to_string()
            }
            ToggleScope::LocalOn => {
                self.translation
                    .set_chat_override(event.chat_id, Some(true))?;
                "Translation for this chat ON.".to_string()
            }
            ToggleScope::LocalOff => {
                self.translation.set_chat_override(event.chat_id, None)?;
                "Translation for this chat OFF.".to_string()
            }
            ToggleScope::Help => TOGGLE_USAGE.to_string(),
        };
        self.reply(event, &reply).await?;

        // Best-effort removal of the trigger message.
        if let Err(e) = self.gateway.delete(event.chat_id, event.message_id).await {
            tracing::debug!("could not delete toggle command: {}", e);
        }
        Ok(())
    }

    // ---------- Incoming ----------

    async fn handle_incoming(&self, event: &InboundEvent) -> Result<()> {
        // Tracked targets are forwarded first, and deliberately without
        // returning: the same message still goes through command matching.
        // Trimmed before the prefix check so the forward suppression and
        // command matching agree on what counts as a command.
        if let Some(rule) = self.translation.tracked(event.sender_id) {
            let text = event.text.trim();
            if !text.is_empty() && !text.starts_with('/') {
                if let Err(e) = self.forward_tracked(event, &rule).await {
                    tracing::error!("tracked-target forward failed: {}", e);
                }
            }
        }

        let cmd = commands::parse(&event.text);

        match &cmd {
            Some(Command::AddTarget { ident, lang }) => {
                return self.cmd_add_target(event, ident, lang).await;
            }
            Some(Command::RemoveTarget { ident }) => {
                return self.cmd_remove_target(event, ident).await;
            }
            Some(Command::AddPanel) => {
                return self.cmd_add_panel(event).await;
            }
            _ => {}
        }

        // Guided-setup continuation: only in the sender's own private
        // chat, so a group message can never advance someone's dialog.
        if event.is_private()
            && event.chat_id == event.sender_id
            && self.sessions.has_session(event.sender_id)
        {
            return self.session_step(event).await;
        }

        match cmd {
            Some(Command::Provision {
                target,
                size,
                name,
                password,
            }) => {
                let Some(size) = ServerSize::from_token(&size) else {
                    return self
                        .reject(
                            event,
                            BotError::Validation("Unknown size! Use 1gb..10gb or unli.".into()),
                        )
                        .await;
                };
                self.provision(event, size, &name, password, Some(target))
                    .await
            }
            Some(Command::ProvisionUsage) => {
                self.reject(
                    event,
                    BotError::Validation(
                        "Format:\n/cpanel <targetId> <size> <name> [password]".into(),
                    ),
                )
                .await
            }
            Some(Command::ProvisionShorthand { size, name, target }) => {
                self.provision(event, size, &name, None, target).await
            }
            Some(Command::ListServers) => self.cmd_list_servers(event).await,
            Some(Command::DeleteServer { query }) => self.cmd_delete_server(event, &query).await,
            Some(Command::ListAccess) => self.cmd_list_access(event).await,
            // Plain text with no open session, or an unknown command:
            // silently ignore.
            _ => Ok(()),
        }
    }

    async fn forward_tracked(
        &self,
        event: &InboundEvent,
        rule: &crate::translation::TargetRule,
    ) -> Result<()> {
        let (masked, entries) = masking::mask(&event.text);
        let translated = match self.translator.translate(&masked, None, &rule.lang).await {
            Ok(t) => masking::restore(&t, &entries),
            Err(e) => {
                tracing::error!("tracked-target translation failed: {}", e);
                "(translation failed)".to_string()
            }
        };

        let info = format!(
            "<b>Message from tracked target (auto-translate)</b>\n\
             <b>From:</b> <code>{}</code>\n\
             <b>Chat:</b> <code>{}</code>\n\n\
             <b>Original:</b>\n{}\n\n\
             <b>Translation ({}):</b>\n{}",
            event.sender_id, event.chat_id, event.text, rule.lang, translated
        );
        let forward_to = rule.forward_to.parse::<i64>().unwrap_or(self.owner_id);
        self.gateway
            .send(forward_to, &info, SendOptions::html())
            .await
    }

    /// Numeric identifiers pass through; anything else goes through the
    /// gateway's entity lookup.
    async fn resolve_identity(&self, ident: &str) -> Result<Option<String>> {
        let ident = ident.trim();
        if !ident.is_empty() && ident.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(ident.to_string()));
        }
        self.gateway.resolve(ident).await
    }

    async fn cmd_add_target(&self, event: &InboundEvent, ident: &str, lang: &str) -> Result<()> {
        if !self.access.is_reseller(event.sender_id) {
            return self
                .reply(event, "You are not allowed to add translation targets.")
                .await;
        }
        let Some(resolved) = self.resolve_identity(ident).await? else {
            return self
                .reply(
                    event,
                    "Could not resolve that username/id. Check the username and make sure the user has started a chat with the agent.",
                )
                .await;
        };
        self.translation.add_target(
            &resolved,
            &self.owner_id.to_string(),
            lang,
            &event.sender_id.to_string(),
        )?;
        self.reply_html(
            event,
            &format!(
                "Target added: <code>{}</code>\nEvery message from this target will be translated and forwarded to the operator ({}).",
                resolved, self.owner_id
            ),
        )
        .await
    }

    async fn cmd_remove_target(&self, event: &InboundEvent, ident: &str) -> Result<()> {
        if !self.access.is_reseller(event.sender_id) {
            return self
                .reply(event, "You are not allowed to remove translation targets.")
                .await;
        }
        // Resolve handles to ids where possible; otherwise the raw string
        // still participates in suffix matching.
        let key = match self.resolve_identity(ident).await? {
            Some(resolved) => resolved,
            None => ident.trim_start_matches('@').to_string(),
        };
        match self.translation.remove_target(&key)? {
            Some(removed) => {
                self.reply_html(event, &format!("Target removed: <code>{}</code>", removed))
                    .await
            }
            None => self.reply(event, "Target not found in the list.").await,
        }
    }

    async fn cmd_add_panel(&self, event: &InboundEvent) -> Result<()> {
        if !self.access.is_owner(event.sender_id) {
            return self.reply(event, "This command is owner-only.").await;
        }
        self.sessions.begin(event.sender_id);
        self.reply(
            event,
            "Panel setup: an admin account on the panel is required.\n\nSend your panel domain.\nExample: https://panel.example.com",
        )
        .await
    }

    async fn session_step(&self, event: &InboundEvent) -> Result<()> {
        let Some(outcome) = self.sessions.advance(event.sender_id, &event.text) else {
            return Ok(());
        };
        match outcome {
            SessionOutcome::NeedPlta => {
                self.reply(
                    event,
                    "Domain saved.\n\nNow send the application API key (PLTA).",
                )
                .await
            }
            SessionOutcome::NeedPltc => {
                self.reply(
                    event,
                    "Application key saved.\n\nNow send the client API key (PLTC).",
                )
                .await
            }
            SessionOutcome::Complete(draft) => {
                // Keep existing default ids when re-running the setup.
                let previous = self.panel_store.load();
                let target = PanelTarget {
                    domain: draft.domain.clone(),
                    plta: draft.plta.clone(),
                    pltc: draft.pltc.clone(),
                    eggid: previous
                        .as_ref()
                        .map(|p| p.eggid.clone())
                        .unwrap_or_else(|| "15".into()),
                    location: previous
                        .as_ref()
                        .map(|p| p.location.clone())
                        .unwrap_or_else(|| "1".into()),
                    nestid: previous.map(|p| p.nestid).unwrap_or_else(|| "5".into()),
                };
                self.panel_store.save(&target)?;
                self.reply_html(
                    event,
                    &format!(
                        "<b>Panel saved!</b>\n\nDomain: <code>{}</code>\nPLTA: <code>{}</code>\nPLTC: <code>{}</code>\n\nThe next /addpanel replaces this profile.",
                        target.domain,
                        util::mask_token(&draft.plta),
                        util::mask_token(&draft.pltc),
                    ),
                )
                .await
            }
        }
    }

    /// The unconfigured check always goes through the store, even with an
    /// injected backend.
    fn provisioner(&self) -> Result<Arc<dyn Provisioner>> {
        let target = self.panel_store.load().ok_or(BotError::NotConfigured)?;
        Ok(match &self.provisioner {
            Some(p) => Arc::clone(p),
            None => Arc::new(PanelClient::new(self.http.clone(), &target)),
        })
    }

    fn ensure_provision_access(&self, event: &InboundEvent) -> Result<()> {
        if self.access.is_reseller(event.sender_id) || self.access.is_group_reseller(event.chat_id)
        {
            Ok(())
        } else {
            Err(BotError::Unauthorized)
        }
    }

    /// Shared provisioning flow for `/cpanel` and the per-size shorthands.
    async fn provision(
        &self,
        event: &InboundEvent,
        size: &ServerSize,
        name: &str,
        password: Option<String>,
        target: Option<String>,
    ) -> Result<()> {
        if let Err(e) = self.ensure_provision_access(event) {
            return self.reject(event, e).await;
        }
        if name.is_empty() {
            return self
                .reject(
                    event,
                    BotError::Validation(format!(
                        "Wrong format!\n\nUse:\n/{size} name or /{size} name,targetId",
                        size = size.token
                    )),
                )
                .await;
        }
        let client = match self.provisioner() {
            Ok(c) => c,
            Err(e) => return self.reject(event, e).await,
        };
        let password = password.unwrap_or_else(util::random_password);

        self.reply(event, "Creating the server...").await?;

        let spec = ServerSpec {
            name: name.to_string(),
            password,
            size: *size,
            admin: false,
        };
        let created = match client.create_server(&spec).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("create server failed: {}", e);
                return self.reply(event, "Failed to create the server.").await;
            }
        };

        // Deliver credentials privately; an explicit target wins, else the
        // invoker receives them.
        let delivery_chat = match &target {
            Some(t) => {
                let resolved = self
                    .resolve_identity(t)
                    .await?
                    .and_then(|id| id.parse::<i64>().ok());
                match resolved {
                    Some(id) => id,
                    None => {
                        return self.reject(event, BotError::Resolution(t.clone())).await;
                    }
                }
            }
            None => event.sender_id,
        };

        // Probe: a private send only works once the recipient has started
        // a conversation with the agent.
        if let Err(e) = self
            .gateway
            .send(delivery_chat, "Checking access...", SendOptions::default())
            .await
        {
            tracing::warn!("delivery probe to {} failed: {}", delivery_chat, e);
            let msg = if target.is_some() {
                format!(
                    "Could not message target id {}. They probably have not started a chat with the agent (or the id is wrong).",
                    delivery_chat
                )
            } else {
                "You have not started a private chat with the agent. Start one first.".to_string()
            };
            return self.reply(event, &msg).await;
        }

        let credentials = format!(
            "<b>Server created!</b>\n\n\
             <b>Panel:</b> {}\n\
             <b>Username:</b> <code>{}</code>\n\
             <b>Password:</b> <code>{}</code>\n\
             <b>ID:</b> <code>{}</code>",
            created.panel_url, created.username, created.password, created.identifier
        );
        if let Err(e) = self
            .gateway
            .send(delivery_chat, &credentials, SendOptions::html())
            .await
        {
            tracing::error!("credential delivery failed: {}", e);
            return self.reply(event, "Failed to deliver the panel data.").await;
        }

        if !event.is_private() {
            self.reply(event, "Panel data delivered in private chat!")
                .await?;
        }
        Ok(())
    }

    async fn cmd_list_servers(&self, event: &InboundEvent) -> Result<()> {
        if let Err(e) = self.ensure_provision_access(event) {
            return self.reject(event, e).await;
        }
        let client = match self.provisioner() {
            Ok(c) => c,
            Err(e) => return self.reject(event, e).await,
        };
        let servers = match client.list_servers().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("list servers failed: {}", e);
                return self.reply(event, "Failed to fetch the server list.").await;
            }
        };
        if servers.is_empty() {
            return self.reply(event, "No servers.").await;
        }
        let mut out = String::from("<b>SERVER LIST</b>\n\n");
        for s in &servers {
            out.push_str(&format!(
                "• <b>{}</b>\nID: <code>{}</code>\nStatus: {}\n\n",
                s.name,
                s.identifier,
                s.status.as_deref().unwrap_or("-")
            ));
        }
        self.reply_html(event, &out).await
    }

    async fn cmd_delete_server(&self, event: &InboundEvent, query: &str) -> Result<()> {
        if let Err(e) = self.ensure_provision_access(event) {
            return self.reject(event, e).await;
        }
        let client = match self.provisioner() {
            Ok(c) => c,
            Err(e) => return self.reject(event, e).await,
        };
        let servers = match client.list_servers().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("list servers failed: {}", e);
                return self.reply(event, "Failed to fetch the server list.").await;
            }
        };
        let query = query.to_lowercase();
        let Some(target) = servers
            .iter()
            .find(|s| s.name.to_lowercase().contains(&query))
        else {
            return self.reply(event, "Server not found.").await;
        };
        if let Err(e) = client.delete_server(target.id).await {
            tracing::error!("delete server failed: {}", e);
            return self.reply(event, "Failed to delete the server!").await;
        }
        self.reply_html(event, &format!("Server <b>{}</b> deleted.", target.name))
            .await
    }

    async fn cmd_list_access(&self, event: &InboundEvent) -> Result<()> {
        let record = self.access.load();
        let fmt = |ids: &[i64]| {
            if ids.is_empty() {
                "-".to_string()
            } else {
                ids.iter()
                    .map(|id| format!("• {}", id))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        let out = format!(
            "Panel access list\n\nResellers (per-user, 1gb-unli):\n{}\n\nReseller groups (every member may provision):\n{}\n\nPanel owners:\n{}",
            fmt(&record.akses),
            fmt(&record.groups),
            fmt(&record.owner),
        );
        self.reply(event, &out).await
    }
}
