//! Explicit command registration and the remote command catalog

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::dispatch::{CommandDispatcher, CommandHandler};
use crate::error::RegistryError;

/// Most commands the remote catalog accepts.
pub const MAX_COMMANDS: usize = 200;
/// Commands registered per guild before the rest go global.
pub const GUILD_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<ParameterDescriptor>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.parameter = Some(ParameterDescriptor {
            name: name.into(),
            description: description.into(),
            required,
        });
        self
    }
}

/// Catalog split the way it is pushed to the remote registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationBatches {
    pub guild: Vec<CommandDescriptor>,
    pub global: Vec<CommandDescriptor>,
}

/// The remote catalog only accepts lowercase names without whitespace.
fn is_catalog_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(char::is_whitespace)
        && name.to_lowercase() == name
}

#[derive(Default)]
pub struct CommandRegistry {
    handlers: Vec<Arc<dyn CommandHandler>>,
    owners: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Fails if one of its command names is already claimed
    /// or is not a valid catalog name.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<(), RegistryError> {
        let descriptors = handler.describe();
        let mut claimed = HashMap::new();
        for descriptor in &descriptors {
            if !is_catalog_name(&descriptor.name) {
                return Err(RegistryError::InvalidName {
                    command: descriptor.name.clone(),
                    handler: handler.name().to_string(),
                });
            }
            let owner = self
                .owners
                .get(&descriptor.name)
                .or_else(|| claimed.get(&descriptor.name));
            if let Some(first) = owner {
                return Err(RegistryError::DuplicateCommand {
                    command: descriptor.name.clone(),
                    first: first.clone(),
                    second: handler.name().to_string(),
                });
            }
            claimed.insert(descriptor.name.clone(), handler.name().to_string());
        }

        debug!(
            handler = handler.name(),
            commands = descriptors.len(),
            "registered command handler"
        );
        self.owners.extend(claimed);
        self.handlers.push(handler);
        Ok(())
    }

    pub fn handlers(&self) -> &[Arc<dyn CommandHandler>] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Every command of every handler, in registration order.
    pub fn catalog(&self) -> Vec<CommandDescriptor> {
        self.handlers
            .iter()
            .flat_map(|handler| handler.describe())
            .collect()
    }

    pub fn registration_batches(&self) -> Result<RegistrationBatches, RegistryError> {
        let mut catalog = self.catalog();
        if catalog.len() > MAX_COMMANDS {
            return Err(RegistryError::TooManyCommands {
                count: catalog.len(),
                limit: MAX_COMMANDS,
            });
        }

        let global = catalog.split_off(catalog.len().min(GUILD_BATCH_SIZE));
        Ok(RegistrationBatches {
            guild: catalog,
            global,
        })
    }

    pub fn into_dispatcher(self) -> CommandDispatcher {
        CommandDispatcher::new(self.handlers)
    }
}
