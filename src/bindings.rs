//! Command registry cache: which handler a remote command id is bound to.

use dashmap::DashMap;
use log::{debug, info, warn};

use crate::commands::BuiltIn;
use crate::error::BridgeResult;
use crate::registry::{CommandRegistry, RegisteredCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    BuiltIn(BuiltIn),
    CustomTag,
}

/// Outcome of looking up an incoming command id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedCommand {
    BuiltIn(BuiltIn),
    CustomTag(u64),
    /// Not bound yet; the dispatcher decides lazily.
    Unknown(u64),
}

/// Process-lifetime map of remote command id to binding. Mutated at startup
/// and by tag add/remove; concurrent readers may briefly miss a new entry.
#[derive(Debug, Default)]
pub struct CommandBindings {
    bindings: DashMap<u64, Binding>,
}

impl CommandBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, command_id: u64, binding: Binding) {
        self.bindings.insert(command_id, binding);
    }

    pub fn unregister(&self, command_id: u64) -> Option<Binding> {
        self.bindings.remove(&command_id).map(|(_, binding)| binding)
    }

    pub fn resolve(&self, command_id: u64) -> ResolvedCommand {
        match self.bindings.get(&command_id).map(|b| *b) {
            Some(Binding::BuiltIn(builtin)) => ResolvedCommand::BuiltIn(builtin),
            Some(Binding::CustomTag) => ResolvedCommand::CustomTag(command_id),
            None => ResolvedCommand::Unknown(command_id),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Binds every global command whose name is a built-in. Built-ins missing
    /// remotely are left alone; registering them is a provisioning step.
    pub async fn sync_commands(&self, registry: &dyn CommandRegistry) -> BridgeResult<usize> {
        let commands = registry.list_commands(None).await?;
        let mut bound = 0;
        for command in &commands {
            match BuiltIn::from_name(&command.name) {
                Some(builtin) => {
                    info!("🔗 Loading global slash command /{} ({})", command.name, command.id);
                    self.register(command.id, Binding::BuiltIn(builtin));
                    bound += 1;
                }
                None => debug!(
                    "Global command /{} ({}) has no built-in handler",
                    command.name, command.id
                ),
            }
        }

        for builtin in missing_builtins(&commands) {
            warn!("⚠️ Built-in /{} is not registered remotely", builtin.name());
        }

        Ok(bound)
    }
}

fn missing_builtins(commands: &[RegisteredCommand]) -> Vec<BuiltIn> {
    BuiltIn::ALL
        .into_iter()
        .filter(|builtin| !commands.iter().any(|c| c.name == builtin.name()))
        .collect()
}
