//! Action Whitelist
//!
//! The ONLY host-mutating commands linkmedic may run. Every action is a named,
//! parameterized list of argument vectors; the single parameter is the target
//! interface, and it may only be one of the interfaces listed for that action.
//!
//! Security properties:
//! - Templates are parsed into argument vectors when the whitelist is loaded.
//!   No command is ever assembled as a string or handed to a shell.
//! - Action names and interfaces are matched by exact string equality.
//! - The interface is substituted as a single opaque argument.
//! - Malformed entries are rejected at load time and abort startup.

use crate::error::{ConfigError, Refusal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Placeholder replaced with the validated interface name
pub const IFACE_PLACEHOLDER: &str = "{iface}";

/// Interface the built-in whitelist targets
pub const DEFAULT_INTERFACE: &str = "wlP9s9";

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
const MAX_IFACE_LEN: usize = 15;

/// One argument of a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTemplate {
    Literal(String),
    Interface,
}

/// A parsed command: an absolute program path plus argument templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<ArgTemplate>,
}

impl CommandTemplate {
    fn parse(action: &str, index: usize, argv: &[String]) -> Result<Self, ConfigError> {
        let (program, rest) = argv.split_first().ok_or_else(|| ConfigError::EmptyCommand {
            action: action.to_string(),
            index,
        })?;

        if !program.starts_with('/') {
            return Err(ConfigError::RelativeProgram {
                action: action.to_string(),
                index,
            });
        }

        let mut args = Vec::with_capacity(rest.len());
        for arg in rest {
            if arg == IFACE_PLACEHOLDER {
                args.push(ArgTemplate::Interface);
            } else if arg.contains(IFACE_PLACEHOLDER) {
                return Err(ConfigError::EmbeddedPlaceholder {
                    action: action.to_string(),
                    index,
                    arg: arg.clone(),
                });
            } else {
                args.push(ArgTemplate::Literal(arg.clone()));
            }
        }

        let found = args
            .iter()
            .filter(|a| matches!(a, ArgTemplate::Interface))
            .count();
        if found != 1 {
            return Err(ConfigError::Placeholder {
                action: action.to_string(),
                index,
                found,
            });
        }

        Ok(Self {
            program: program.clone(),
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute the interface and return the full argument vector
    pub fn render(&self, interface: &str) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| match a {
                ArgTemplate::Literal(s) => s.clone(),
                ArgTemplate::Interface => interface.to_string(),
            }))
            .collect()
    }

    /// Template rendered with the placeholder left in place, for display
    pub fn display(&self) -> String {
        self.render(IFACE_PLACEHOLDER).join(" ")
    }
}

/// A whitelisted remediation action. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    commands: Vec<CommandTemplate>,
    allowed_interfaces: BTreeSet<String>,
}

impl ActionSpec {
    pub fn commands(&self) -> &[CommandTemplate] {
        &self.commands
    }

    pub fn allowed_interfaces(&self) -> &BTreeSet<String> {
        &self.allowed_interfaces
    }

    /// Build the ordered argument vectors for an already-validated interface
    fn build(&self, interface: &str) -> Vec<Vec<String>> {
        self.commands.iter().map(|c| c.render(interface)).collect()
    }
}

/// On-disk shape of one action
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAction {
    description: String,
    commands: Vec<Vec<String>>,
    interfaces: Vec<String>,
}

/// On-disk shape of the whitelist file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWhitelist {
    #[serde(default)]
    actions: BTreeMap<String, RawAction>,
}

/// The complete, validated set of permitted actions
#[derive(Debug, Clone)]
pub struct ActionWhitelist {
    actions: BTreeMap<String, ActionSpec>,
}

impl ActionWhitelist {
    /// Built-in whitelist: reset, down and up for the default wireless interface
    pub fn builtin() -> Self {
        let link = |state: &str| CommandTemplate {
            program: "/usr/sbin/ip".to_string(),
            args: vec![
                ArgTemplate::Literal("link".to_string()),
                ArgTemplate::Literal("set".to_string()),
                ArgTemplate::Interface,
                ArgTemplate::Literal(state.to_string()),
            ],
        };
        let spec = |name: &str, description: &str, commands: Vec<CommandTemplate>| ActionSpec {
            name: name.to_string(),
            description: description.to_string(),
            commands,
            allowed_interfaces: [DEFAULT_INTERFACE.to_string()].into_iter().collect(),
        };

        let actions = [
            spec(
                "wifi_reset",
                "Reset WiFi (down then up)",
                vec![link("down"), link("up")],
            ),
            spec("wifi_down", "Bring WiFi down", vec![link("down")]),
            spec("wifi_up", "Bring WiFi up", vec![link("up")]),
        ]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();

        Self { actions }
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawWhitelist = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let whitelist = Self::from_raw(raw)?;
        info!(
            "Loaded whitelist from {} ({} actions)",
            path.display(),
            whitelist.len()
        );
        Ok(whitelist)
    }

    /// Load from `path` if given, otherwise use the built-in whitelist.
    ///
    /// An explicitly configured file that is missing or malformed is an error,
    /// never a silent fallback.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                warn!("No whitelist file configured, using built-in actions");
                Ok(Self::builtin())
            }
        }
    }

    /// Parse and validate a whitelist from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawWhitelist = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawWhitelist) -> Result<Self, ConfigError> {
        if raw.actions.is_empty() {
            return Err(ConfigError::EmptyWhitelist);
        }

        let mut actions = BTreeMap::new();
        for (name, entry) in raw.actions {
            if !is_valid_action_name(&name) {
                return Err(ConfigError::InvalidActionName(name));
            }
            if entry.commands.is_empty() {
                return Err(ConfigError::NoCommands(name));
            }
            if entry.interfaces.is_empty() {
                return Err(ConfigError::NoInterfaces(name));
            }

            let commands = entry
                .commands
                .iter()
                .enumerate()
                .map(|(i, argv)| CommandTemplate::parse(&name, i, argv))
                .collect::<Result<Vec<_>, _>>()?;

            let mut allowed_interfaces = BTreeSet::new();
            for iface in entry.interfaces {
                if !is_valid_interface_name(&iface) {
                    return Err(ConfigError::InvalidInterface {
                        action: name,
                        interface: iface,
                    });
                }
                allowed_interfaces.insert(iface);
            }

            actions.insert(
                name.clone(),
                ActionSpec {
                    name,
                    description: entry.description,
                    commands,
                    allowed_interfaces,
                },
            );
        }

        Ok(Self { actions })
    }

    /// Check that `action` is whitelisted and `interface` is allowed for it.
    ///
    /// Both checks are exact string comparisons.
    pub fn validate(&self, action: &str, interface: &str) -> Result<&ActionSpec, Refusal> {
        let spec = self
            .actions
            .get(action)
            .ok_or_else(|| Refusal::UnknownAction(action.to_string()))?;

        if !spec.allowed_interfaces.contains(interface) {
            return Err(Refusal::InterfaceNotAllowed {
                action: action.to_string(),
                interface: interface.to_string(),
            });
        }

        Ok(spec)
    }

    /// Validate and return the ordered argument vectors for an action
    pub fn build_commands(
        &self,
        action: &str,
        interface: &str,
    ) -> Result<Vec<Vec<String>>, Refusal> {
        let spec = self.validate(action, interface)?;
        Ok(spec.build(interface))
    }

    pub fn get(&self, action: &str) -> Option<&ActionSpec> {
        self.actions.get(action)
    }

    /// Action names in stable order
    pub fn names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn is_valid_action_name(name: &str) -> bool {
    !name.is_empty()
        && name != crate::types::NO_ACTION
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_valid_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IFACE_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
