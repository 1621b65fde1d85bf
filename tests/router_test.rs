//! End-to-end dispatch tests against a mock gateway and translator.

use async_trait::async_trait;
use panelbot::access::{AccessRecord, AccessStore};
use panelbot::error::{BotError, Result};
use panelbot::gateway::{Gateway, InboundEvent, SendOptions};
use panelbot::panel::{CreatedServer, PanelStore, Provisioner, ServerSpec, ServerSummary};
use panelbot::router::Router;
use panelbot::translation::TranslationStore;
use panelbot::translator::Translator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const OWNER: i64 = 777;

#[derive(Default)]
struct MockGateway {
    sent: Mutex<Vec<(i64, String, SendOptions)>>,
    edits: Mutex<Vec<(i64, i32, String)>>,
    deletes: Mutex<Vec<(i64, i32)>>,
    fail_edits: bool,
    unreachable_chats: Vec<i64>,
    resolutions: HashMap<String, String>,
}

impl MockGateway {
    fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == chat_id)
            .map(|(_, t, _)| t.clone())
            .collect()
    }

    fn all_sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send(&self, chat_id: i64, text: &str, opts: SendOptions) -> Result<()> {
        if self.unreachable_chats.contains(&chat_id) {
            return Err(BotError::Delivery(format!("chat {} unreachable", chat_id)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), opts));
        Ok(())
    }

    async fn edit(&self, chat_id: i64, message_id: i32, text: &str) -> Result<()> {
        if self.fail_edits {
            return Err(BotError::Delivery("message can't be edited".into()));
        }
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.deletes.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn resolve(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self.resolutions.get(identifier).cloned())
    }
}

/// In-memory provisioning backend with a fixed server list.
#[derive(Default)]
struct MockProvisioner {
    servers: Vec<ServerSummary>,
    deletes: Mutex<Vec<u64>>,
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        Ok(CreatedServer {
            username: spec.name.to_lowercase(),
            password: spec.password.clone(),
            identifier: "abc123".to_string(),
            id: 1,
            panel_url: "https://p.test".to_string(),
        })
    }

    async fn list_servers(&self) -> Result<Vec<ServerSummary>> {
        Ok(self.servers.clone())
    }

    async fn delete_server(&self, id: u64) -> Result<()> {
        self.deletes.lock().unwrap().push(id);
        Ok(())
    }
}

fn summary(id: u64, name: &str) -> ServerSummary {
    ServerSummary {
        id,
        identifier: format!("srv{}", id),
        name: name.to_string(),
        status: None,
    }
}

/// Tags the output so tests can see both the target language and the text
/// the translator actually received.
struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(&self, text: &str, _from: Option<&str>, to: &str) -> Result<String> {
        Ok(format!("[{}] {}", to, text))
    }
}

struct Fixture {
    gateway: Arc<MockGateway>,
    router: Router,
    dir: tempfile::TempDir,
}

fn fixture(gateway: MockGateway, access: AccessRecord) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let access_path = dir.path().join("access.json");
    std::fs::write(&access_path, serde_json::to_string(&access).unwrap()).unwrap();

    let gateway = Arc::new(gateway);
    let router = Router::new(
        Arc::clone(&gateway) as Arc<dyn Gateway>,
        Arc::new(TaggingTranslator),
        AccessStore::new(access_path, OWNER),
        TranslationStore::load(dir.path().join("translations.json")),
        PanelStore::new(dir.path().join("panel.json")),
        OWNER,
        "id".to_string(),
        "en".to_string(),
    );
    Fixture {
        gateway,
        router,
        dir,
    }
}

/// Fixture with a panel profile on disk and a stub provisioning backend.
fn configured_fixture(
    gateway: MockGateway,
    access: AccessRecord,
    provisioner: Arc<MockProvisioner>,
) -> Fixture {
    let Fixture {
        gateway,
        router,
        dir,
    } = fixture(gateway, access);
    std::fs::write(
        dir.path().join("panel.json"),
        r#"{"domain":"https://p.test","plta":"key-a","pltc":"key-c"}"#,
    )
    .unwrap();
    Fixture {
        gateway,
        router: router.with_provisioner(provisioner),
        dir,
    }
}

fn outgoing(chat_id: i64, message_id: i32, text: &str) -> InboundEvent {
    InboundEvent {
        chat_id,
        sender_id: OWNER,
        message_id,
        text: text.to_string(),
        outgoing: true,
    }
}

fn incoming(chat_id: i64, sender_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        chat_id,
        sender_id,
        message_id: 1,
        text: text.to_string(),
        outgoing: false,
    }
}

fn reseller_access(id: i64) -> AccessRecord {
    AccessRecord {
        akses: vec![id],
        owner: vec![],
        groups: vec![],
    }
}

#[tokio::test]
async fn toggle_enables_outgoing_edit_then_disables() {
    let f = fixture(MockGateway::default(), AccessRecord::default());

    f.router.handle_event(outgoing(123, 10, "/terjemahan on")).await;
    let replies = f.gateway.sent_to(123);
    assert!(replies[0].contains("GLOBAL ON"));
    // The trigger message is deleted best-effort.
    assert_eq!(*f.gateway.deletes.lock().unwrap(), vec![(123, 10)]);

    f.router.handle_event(outgoing(456, 11, "Halo dunia")).await;
    let edits = f.gateway.edits.lock().unwrap().clone();
    assert_eq!(edits, vec![(456, 11, "[en] Halo dunia".to_string())]);

    f.router.handle_event(outgoing(123, 12, "/terjemahan off")).await;
    f.router.handle_event(outgoing(456, 13, "Halo lagi")).await;
    // No new edit after the toggle-off.
    assert_eq!(f.gateway.edits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn outgoing_commands_are_never_translated() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router.handle_event(outgoing(1, 1, "/terjemahan on")).await;

    f.router.handle_event(outgoing(1, 2, "/listserver")).await;
    assert!(f.gateway.edits.lock().unwrap().is_empty());
    // Only the toggle reply was ever sent.
    assert_eq!(f.gateway.sent_to(1).len(), 1);
}

#[tokio::test]
async fn edit_failure_falls_back_to_reply() {
    let f = fixture(
        MockGateway {
            fail_edits: true,
            ..Default::default()
        },
        AccessRecord::default(),
    );
    f.router.handle_event(outgoing(1, 1, "/terjemahan on")).await;
    f.router.handle_event(outgoing(50, 9, "Halo dunia")).await;

    let sent = f.gateway.sent.lock().unwrap();
    let fallback = sent
        .iter()
        .find(|(c, t, _)| *c == 50 && t == "[en] Halo dunia")
        .expect("fallback reply sent");
    assert_eq!(fallback.2.reply_to, Some(9));
}

#[tokio::test]
async fn local_toggle_covers_only_one_chat() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router
        .handle_event(outgoing(42, 1, "/terjemahan local on"))
        .await;

    f.router.handle_event(outgoing(42, 2, "satu")).await;
    f.router.handle_event(outgoing(43, 3, "dua")).await;

    let edits = f.gateway.edits.lock().unwrap().clone();
    assert_eq!(edits, vec![(42, 2, "[en] satu".to_string())]);
}

#[tokio::test]
async fn masked_spans_survive_outgoing_translation() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router.handle_event(outgoing(1, 1, "/terjemahan on")).await;
    f.router
        .handle_event(outgoing(7, 2, "lihat https://contoh.id dan @budi"))
        .await;

    let edits = f.gateway.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    let text = &edits[0].2;
    assert!(text.contains("https://contoh.id"));
    assert!(text.contains("@budi"));
    assert!(!text.contains("__MASK_"));
}

#[tokio::test]
async fn add_target_then_forward_tracked_message() {
    let reseller = 100;
    let mut gateway = MockGateway::default();
    gateway
        .resolutions
        .insert("@someuser".to_string(), "12345".to_string());
    let f = fixture(gateway, reseller_access(reseller));

    f.router
        .handle_event(incoming(reseller, reseller, "/add @someuser en"))
        .await;
    let replies = f.gateway.sent_to(reseller);
    assert!(replies[0].contains("12345"));

    // A later message from the tracked identity is forwarded to the owner
    // with both original and translation.
    f.router.handle_event(incoming(999, 12345, "bonjour")).await;
    let forwarded = f.gateway.sent_to(OWNER);
    assert_eq!(forwarded.len(), 1);
    assert!(forwarded[0].contains("bonjour"));
    assert!(forwarded[0].contains("[en] bonjour"));
    assert!(forwarded[0].contains("12345"));
}

#[tokio::test]
async fn tracked_target_commands_still_match() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router
        .translation_store()
        .add_target("555", &OWNER.to_string(), "en", "777")
        .unwrap();

    // A command from a tracked target is not forwarded, but the command
    // branch still runs (documented permissive ordering).
    f.router.handle_event(incoming(555, 555, "/cekakses")).await;
    assert!(f.gateway.sent_to(OWNER).is_empty());
    let replies = f.gateway.sent_to(555);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("Panel access list"));
}

#[tokio::test]
async fn tracked_target_padded_command_is_not_forwarded() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router
        .translation_store()
        .add_target("555", &OWNER.to_string(), "en", "777")
        .unwrap();

    // Leading whitespace must not turn a command into forwardable text.
    f.router
        .handle_event(incoming(555, 555, "  /cekakses"))
        .await;
    assert!(f.gateway.sent_to(OWNER).is_empty());
    let replies = f.gateway.sent_to(555);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("Panel access list"));
}

#[tokio::test]
async fn add_target_requires_grant_and_resolution() {
    let f = fixture(MockGateway::default(), AccessRecord::default());

    f.router.handle_event(incoming(5, 5, "/add @nobody en")).await;
    assert!(f.gateway.sent_to(5)[0].contains("not allowed"));

    // Authorized but unresolvable.
    let f = fixture(MockGateway::default(), reseller_access(5));
    f.router.handle_event(incoming(5, 5, "/add @nobody en")).await;
    assert!(f.gateway.sent_to(5)[0].contains("Could not resolve"));
}

#[tokio::test]
async fn remove_target_by_suffix_and_not_found() {
    let f = fixture(MockGateway::default(), reseller_access(5));
    f.router
        .translation_store()
        .add_target("100200300", &OWNER.to_string(), "id", "5")
        .unwrap();

    f.router.handle_event(incoming(5, 5, "/del 300")).await;
    assert!(f.gateway.sent_to(5)[0].contains("100200300"));

    f.router.handle_event(incoming(5, 5, "/del 300")).await;
    assert!(f.gateway.sent_to(5)[1].contains("not found"));
}

#[tokio::test]
async fn provision_denied_without_grant() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router.handle_event(incoming(5, 5, "/2gb alice")).await;
    let replies = f.gateway.sent_to(5);
    assert_eq!(replies, vec!["You have no access!".to_string()]);
}

#[tokio::test]
async fn group_reseller_grant_allows_provision_path() {
    let f = fixture(
        MockGateway::default(),
        AccessRecord {
            akses: vec![],
            owner: vec![],
            groups: vec![-100],
        },
    );
    // Sender has no personal grant, but the chat is a reseller group, so
    // the flow proceeds to the configuration check.
    f.router.handle_event(incoming(-100, 5, "/2gb alice")).await;
    let replies = f.gateway.sent_to(-100);
    assert!(replies[0].contains("not configured"));
}

#[tokio::test]
async fn unconfigured_panel_short_circuits_before_any_remote_call() {
    let f = fixture(MockGateway::default(), reseller_access(5));
    f.router.handle_event(incoming(5, 5, "/2gb alice")).await;

    let all = f.gateway.all_sent();
    assert_eq!(all.len(), 1);
    assert!(all[0].contains("not configured"));
    // In particular, the progress notice never went out.
    assert!(!all.iter().any(|t| t.contains("Creating")));
}

#[tokio::test]
async fn cpanel_validates_size_and_arity() {
    let f = fixture(MockGateway::default(), reseller_access(5));

    f.router
        .handle_event(incoming(5, 5, "/cpanel 123 99gb alice"))
        .await;
    assert!(f.gateway.sent_to(5)[0].contains("Unknown size"));

    f.router.handle_event(incoming(5, 5, "/cpanel 123")).await;
    assert!(f.gateway.sent_to(5)[1].contains("Format"));
}

#[tokio::test]
async fn delserver_unconfigured_makes_no_delete_call() {
    let f = fixture(MockGateway::default(), reseller_access(5));
    f.router
        .handle_event(incoming(5, 5, "/delserver nonexistent"))
        .await;
    assert!(f.gateway.sent_to(5)[0].contains("not configured"));
}

#[tokio::test]
async fn delserver_miss_on_configured_panel_calls_no_delete() {
    let prov = Arc::new(MockProvisioner {
        servers: vec![summary(7, "alice's Server")],
        ..Default::default()
    });
    let f = configured_fixture(
        MockGateway::default(),
        reseller_access(5),
        Arc::clone(&prov),
    );
    f.router
        .handle_event(incoming(5, 5, "/delserver zzz"))
        .await;
    assert!(f.gateway.sent_to(5)[0].contains("not found"));
    // The listing was consulted but nothing was deleted.
    assert!(prov.deletes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delserver_matches_substring_case_insensitively() {
    let prov = Arc::new(MockProvisioner {
        servers: vec![summary(7, "alice's Server"), summary(8, "bob's Server")],
        ..Default::default()
    });
    let f = configured_fixture(
        MockGateway::default(),
        reseller_access(5),
        Arc::clone(&prov),
    );
    f.router
        .handle_event(incoming(5, 5, "/delserver ALICE"))
        .await;
    assert!(f.gateway.sent_to(5)[0].contains("deleted"));
    assert_eq!(*prov.deletes.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn provision_delivers_credentials_to_invoker() {
    let f = configured_fixture(
        MockGateway::default(),
        reseller_access(5),
        Arc::new(MockProvisioner::default()),
    );
    f.router.handle_event(incoming(5, 5, "/2gb alice")).await;

    let replies = f.gateway.sent_to(5);
    assert!(replies[0].contains("Creating"));
    assert!(replies[1].contains("Checking access"));
    assert!(replies[2].contains("Server created"));
    assert!(replies[2].contains("alice"));
    assert!(replies[2].contains("abc123"));
}

#[tokio::test]
async fn addpanel_session_full_walkthrough() {
    let f = fixture(MockGateway::default(), AccessRecord::default());

    // Owner-only gate.
    f.router.handle_event(incoming(5, 5, "/addpanel")).await;
    assert!(f.gateway.sent_to(5)[0].contains("owner-only"));

    f.router.handle_event(incoming(OWNER, OWNER, "/addpanel")).await;
    f.router
        .handle_event(incoming(OWNER, OWNER, "https://panel.example.com"))
        .await;
    f.router
        .handle_event(incoming(OWNER, OWNER, "ptla_0123456789abcd"))
        .await;
    f.router
        .handle_event(incoming(OWNER, OWNER, "ptlc_0123456789wxyz"))
        .await;

    let replies = f.gateway.sent_to(OWNER);
    assert!(replies[0].contains("domain"));
    assert!(replies[1].contains("PLTA"));
    assert!(replies[2].contains("PLTC"));
    // Credentials are elided in the confirmation.
    assert!(replies[3].contains("ptla_0***abcd"));
    assert!(replies[3].contains("ptlc_0***wxyz"));
    assert!(!replies[3].contains("ptla_0123456789abcd"));

    // The profile landed on disk.
    let target = PanelStore::new(f.dir.path().join("panel.json"))
        .load()
        .unwrap();
    assert_eq!(target.domain, "https://panel.example.com");
    assert_eq!(target.plta, "ptla_0123456789abcd");
}

#[tokio::test]
async fn session_does_not_advance_outside_private_chat() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router.handle_event(incoming(OWNER, OWNER, "/addpanel")).await;

    // Group message from the owner must not feed the session.
    f.router
        .handle_event(incoming(-100, OWNER, "https://hijack.example"))
        .await;

    // The private-chat message is still treated as the domain step.
    f.router
        .handle_event(incoming(OWNER, OWNER, "https://real.example"))
        .await;
    f.router.handle_event(incoming(OWNER, OWNER, "key-a")).await;
    f.router.handle_event(incoming(OWNER, OWNER, "key-c")).await;

    let target = PanelStore::new(f.dir.path().join("panel.json"))
        .load()
        .unwrap();
    assert_eq!(target.domain, "https://real.example");
}

#[tokio::test]
async fn session_isolated_between_identities() {
    let f = fixture(
        MockGateway::default(),
        AccessRecord {
            akses: vec![],
            owner: vec![200],
            groups: vec![],
        },
    );
    f.router.handle_event(incoming(OWNER, OWNER, "/addpanel")).await;
    f.router.handle_event(incoming(200, 200, "/addpanel")).await;

    // B's private messages advance only B's session.
    f.router
        .handle_event(incoming(200, 200, "https://b.example"))
        .await;
    f.router.handle_event(incoming(200, 200, "b-plta")).await;
    f.router.handle_event(incoming(200, 200, "b-pltc")).await;

    let target = PanelStore::new(f.dir.path().join("panel.json"))
        .load()
        .unwrap();
    assert_eq!(target.domain, "https://b.example");

    // A's session is still at the domain step.
    f.router
        .handle_event(incoming(OWNER, OWNER, "https://a.example"))
        .await;
    let replies = f.gateway.sent_to(OWNER);
    assert!(replies.last().unwrap().contains("PLTA"));
}

#[tokio::test]
async fn plain_text_without_session_is_silently_ignored() {
    let f = fixture(MockGateway::default(), AccessRecord::default());
    f.router.handle_event(incoming(5, 5, "just chatting")).await;
    f.router.handle_event(incoming(5, 5, "/unknowncmd")).await;
    assert!(f.gateway.all_sent().is_empty());
}

#[tokio::test]
async fn cekakses_is_open_and_lists_all_sets() {
    let f = fixture(
        MockGateway::default(),
        AccessRecord {
            akses: vec![1, 2],
            owner: vec![3],
            groups: vec![-4],
        },
    );
    // Unprivileged caller.
    f.router.handle_event(incoming(9, 9, "/cekakses")).await;
    let reply = &f.gateway.sent_to(9)[0];
    assert!(reply.contains("• 1"));
    assert!(reply.contains("• 2"));
    assert!(reply.contains("• 3"));
    assert!(reply.contains("• -4"));
}
