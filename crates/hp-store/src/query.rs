//! Store queries and partial updates.

use hp_model::{Protocol, Rule, Stage};

/// Filter for [`crate::ProtocolStore::find`]. The default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolQuery {
    /// Case-insensitive substring of the protocol name.
    pub name_contains: Option<String>,
    pub locked: Option<bool>,
}

impl ProtocolQuery {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name_contains(mut self, text: impl Into<String>) -> Self {
        self.name_contains = Some(text.into());
        self
    }

    #[must_use]
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = Some(locked);
        self
    }

    pub fn matches(&self, protocol: &Protocol) -> bool {
        let name_ok = self.name_contains.as_ref().is_none_or(|needle| {
            protocol
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        let locked_ok = self.locked.is_none_or(|locked| protocol.locked == locked);
        name_ok && locked_ok
    }
}

/// Fields to replace on an existing protocol. `id` is never patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolPatch {
    pub name: Option<String>,
    pub locked: Option<bool>,
    pub protocol_matching_rules: Option<Vec<Rule>>,
    pub stages: Option<Vec<Stage>>,
    /// Recorded as `modifiedBy`.
    pub modified_by: Option<String>,
}

impl ProtocolPatch {
    /// A patch replacing every editable field with the values of `protocol`.
    pub fn from_protocol(protocol: &Protocol) -> Self {
        Self {
            name: Some(protocol.name.clone()),
            locked: Some(protocol.locked),
            protocol_matching_rules: Some(protocol.protocol_matching_rules.clone()),
            stages: Some(protocol.stages.clone()),
            modified_by: protocol.modified_by.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.locked.is_none()
            && self.protocol_matching_rules.is_none()
            && self.stages.is_none()
    }

    /// Apply the patch and the modification bookkeeping.
    pub fn apply(self, protocol: &mut Protocol) {
        if let Some(name) = self.name {
            protocol.name = name;
        }
        if let Some(locked) = self.locked {
            protocol.locked = locked;
        }
        if let Some(rules) = self.protocol_matching_rules {
            protocol.protocol_matching_rules = rules;
        }
        if let Some(stages) = self.stages {
            protocol.stages = stages;
        }
        protocol.protocol_was_modified(self.modified_by.as_deref());
    }
}
