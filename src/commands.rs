//! Command parsing
//!
//! Turns raw message text into a `Command` variant so routing can be
//! tested without any handlers. Anything that is not a recognized command
//! parses to `None` and is ignored by the router.

use crate::panel::ServerSize;

/// `/terjemahan` subcommand scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleScope {
    GlobalOn,
    GlobalOff,
    LocalOn,
    LocalOff,
    /// Unknown/missing subcommand; reply with usage.
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/terjemahan on|off|local on|local off`
    TranslateToggle(ToggleScope),
    /// `/add <ident> [lang]`
    AddTarget { ident: String, lang: String },
    /// `/del <ident>`
    RemoveTarget { ident: String },
    /// `/addpanel`
    AddPanel,
    /// `/cpanel <targetId> <size> <name> [password]`. `size` is kept raw so
    /// the handler can report an unknown token as a validation reply.
    Provision {
        target: String,
        size: String,
        name: String,
        password: Option<String>,
    },
    /// Bad `/cpanel` arity; the payload is the usage text.
    ProvisionUsage,
    /// `/<size> <name>[,<targetId>]`
    ProvisionShorthand {
        size: &'static ServerSize,
        name: String,
        target: Option<String>,
    },
    /// `/listserver`
    ListServers,
    /// `/delserver <name-substring>`
    DeleteServer { query: String },
    /// `/cekakses`
    ListAccess,
}

pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    if let Some(rest) = text.strip_prefix("/terjemahan") {
        if rest.is_empty() || rest.starts_with(' ') {
            return Some(Command::TranslateToggle(parse_toggle(rest)));
        }
    }

    if let Some(rest) = text.strip_prefix("/add ") {
        let mut parts = rest.split_whitespace();
        let ident = parts.next()?.to_string();
        let lang = parts.next().unwrap_or("id").to_string();
        return Some(Command::AddTarget { ident, lang });
    }

    if let Some(rest) = text.strip_prefix("/del ") {
        let ident = rest.split_whitespace().next()?.to_string();
        return Some(Command::RemoveTarget { ident });
    }

    if text == "/addpanel" || text.starts_with("/addpanel ") {
        return Some(Command::AddPanel);
    }

    if text == "/cpanel" || text.starts_with("/cpanel ") {
        let args: Vec<&str> = text.split_whitespace().skip(1).collect();
        if args.len() < 3 {
            return Some(Command::ProvisionUsage);
        }
        return Some(Command::Provision {
            target: args[0].to_string(),
            size: args[1].to_lowercase(),
            name: args[2].to_string(),
            password: args.get(3).map(|s| s.to_string()),
        });
    }

    // Per-size shorthand: /2gb name or /2gb name,targetId
    for size in crate::panel::SIZES {
        let prefix = format!("/{} ", size.token);
        if let Some(raw) = text.strip_prefix(&prefix) {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            let (name, target) = match raw.split_once(',') {
                Some((name, target)) => {
                    (name.trim().to_string(), Some(target.trim().to_string()))
                }
                None => (raw.to_string(), None),
            };
            return Some(Command::ProvisionShorthand { size, name, target });
        }
    }

    if text == "/listserver" {
        return Some(Command::ListServers);
    }

    if let Some(rest) = text.strip_prefix("/delserver ") {
        let query = rest.trim().to_string();
        if query.is_empty() {
            return None;
        }
        return Some(Command::DeleteServer { query });
    }

    if text == "/cekakses" {
        return Some(Command::ListAccess);
    }

    None
}

fn parse_toggle(rest: &str) -> ToggleScope {
    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some("on") => ToggleScope::GlobalOn,
        Some("off") => ToggleScope::GlobalOff,
        Some("local") => match parts.next() {
            Some("on") => ToggleScope::LocalOn,
            Some("off") => ToggleScope::LocalOff,
            _ => ToggleScope::Help,
        },
        _ => ToggleScope::Help,
    }
}
