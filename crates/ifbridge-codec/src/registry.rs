use std::collections::HashMap;
use std::sync::Arc;

use ifbridge_config::ConfigError;
use ifbridge_frame::interface_type_name;

use crate::error::Result;
use crate::interface::Interface;

/// The interfaces of one codec, reachable by type (inbound routing) and by
/// name (outbound API and configuration).
#[derive(Default)]
pub struct InterfaceRegistry {
    by_type: HashMap<u8, Arc<dyn Interface>>,
    by_name: HashMap<String, Arc<dyn Interface>>,
    order: Vec<Arc<dyn Interface>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interface. Names and types must be unique.
    pub fn insert(&mut self, interface: Arc<dyn Interface>) -> Result<()> {
        let if_type = interface.if_type();
        if let Some(existing) = self.by_type.get(&if_type) {
            return Err(ConfigError::Invalid(format!(
                "interface '{}' and '{}' both use type 0x{if_type:02X} ({})",
                existing.name(),
                interface.name(),
                interface_type_name(if_type)
            ))
            .into());
        }
        if self.by_name.contains_key(interface.name()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate interface name '{}'",
                interface.name()
            ))
            .into());
        }

        self.by_type.insert(if_type, interface.clone());
        self.by_name
            .insert(interface.name().to_string(), interface.clone());
        self.order.push(interface);
        Ok(())
    }

    pub fn by_type(&self, if_type: u8) -> Option<Arc<dyn Interface>> {
        self.by_type.get(&if_type).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Interface>> {
        self.by_name.get(name).cloned()
    }

    pub fn contains_type(&self, if_type: u8) -> bool {
        self.by_type.contains_key(&if_type)
    }

    /// Interfaces in registration order.
    pub fn interfaces(&self) -> Vec<Arc<dyn Interface>> {
        self.order.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|interface| interface.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_type.clear();
        self.by_name.clear();
        self.order.clear();
    }
}

impl std::fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceRegistry")
            .field("interfaces", &self.names())
            .finish()
    }
}
