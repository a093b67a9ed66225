//! Protocol, stage and viewport documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::layout::ViewportStructure;
use crate::rule::{Rule, RuleLevel};
use crate::value::AttributeValue;

/// Identifier of the built-in fallback protocol.
pub const DEFAULT_PROTOCOL_ID: &str = "defaultProtocol";

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One layout slot of a stage with its study, series and image rules.
///
/// The slot does not hold the series or image it currently shows; that
/// binding is produced by viewport assignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    #[serde(default)]
    pub study_matching_rules: Vec<Rule>,
    #[serde(default)]
    pub series_matching_rules: Vec<Rule>,
    #[serde(default)]
    pub image_matching_rules: Vec<Rule>,
    /// Display settings handed to the renderer (`wlPreset`, `invert`, ...).
    /// Stored as authored; see [`Viewport::display_settings`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub viewport_settings: BTreeMap<String, AttributeValue>,
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self, level: RuleLevel) -> &[Rule] {
        match level {
            RuleLevel::Study => &self.study_matching_rules,
            RuleLevel::Series => &self.series_matching_rules,
            RuleLevel::Image => &self.image_matching_rules,
        }
    }

    pub fn rules_mut(&mut self, level: RuleLevel) -> &mut Vec<Rule> {
        match level {
            RuleLevel::Study => &mut self.study_matching_rules,
            RuleLevel::Series => &mut self.series_matching_rules,
            RuleLevel::Image => &mut self.image_matching_rules,
        }
    }

    pub fn add_rule(&mut self, level: RuleLevel, rule: Rule) {
        self.rules_mut(level).push(rule);
    }

    /// Remove the rule at `index` of the given level.
    pub fn remove_rule(&mut self, level: RuleLevel, index: usize) -> Option<Rule> {
        let rules = self.rules_mut(level);
        (index < rules.len()).then(|| rules.remove(index))
    }

    #[must_use]
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.viewport_settings.insert(name.into(), value.into());
        self
    }

    /// Settings as the renderer expects them: `"YES"` and `"NO"` become
    /// booleans, everything else is passed through.
    pub fn display_settings(&self) -> BTreeMap<String, AttributeValue> {
        self.viewport_settings
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    AttributeValue::Text(text) if text == "YES" => AttributeValue::Bool(true),
                    AttributeValue::Text(text) if text == "NO" => AttributeValue::Bool(false),
                    other => other.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// True when no rule is declared at any level.
    pub fn has_no_rules(&self) -> bool {
        self.study_matching_rules.is_empty()
            && self.series_matching_rules.is_empty()
            && self.image_matching_rules.is_empty()
    }
}

/// One layout configuration of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub viewport_structure: ViewportStructure,
    #[serde(default)]
    pub viewports: Vec<Viewport>,
}

impl Stage {
    /// Create a stage whose viewport array matches its layout.
    pub fn new(name: impl Into<String>, viewport_structure: ViewportStructure) -> Self {
        let count = viewport_structure.viewport_count();
        Self {
            id: new_id(),
            name: Some(name.into()),
            viewport_structure,
            viewports: vec![Viewport::default(); count],
        }
    }

    /// Builder-style replacement of the viewport array.
    #[must_use]
    pub fn with_viewports(mut self, viewports: Vec<Viewport>) -> Self {
        self.viewports = viewports;
        self
    }

    /// Copy of this stage under a fresh id.
    pub fn create_clone(&self, name: Option<&str>) -> Self {
        let mut clone = self.clone();
        clone.id = new_id();
        if let Some(name) = name {
            clone.name = Some(name.to_string());
        }
        clone
    }

    /// Whether the viewport array length agrees with the layout.
    pub fn is_consistent(&self) -> bool {
        self.viewports.len() == self.viewport_structure.viewport_count()
    }
}

/// A hanging protocol document.
///
/// `id` never changes once assigned. `numberOfPriorsReferenced` is derived
/// from the stage rules and recomputed by [`Protocol::protocol_was_modified`]
/// and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ProtocolRecord")]
pub struct Protocol {
    id: String,
    pub name: String,
    pub locked: bool,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    number_of_priors_referenced: u32,
    pub protocol_matching_rules: Vec<Rule>,
    pub stages: Vec<Stage>,
}

/// Deserialization mirror of [`Protocol`]; derived fields are recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolRecord {
    #[serde(default = "new_id")]
    id: String,
    name: String,
    #[serde(default)]
    locked: bool,
    #[serde(default = "Utc::now")]
    created_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    modified_date: DateTime<Utc>,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    modified_by: Option<String>,
    #[serde(default)]
    protocol_matching_rules: Vec<Rule>,
    #[serde(default)]
    stages: Vec<Stage>,
}

impl From<ProtocolRecord> for Protocol {
    fn from(record: ProtocolRecord) -> Self {
        let mut protocol = Self {
            id: record.id,
            name: record.name,
            locked: record.locked,
            created_date: record.created_date,
            modified_date: record.modified_date,
            created_by: record.created_by,
            modified_by: record.modified_by,
            number_of_priors_referenced: 0,
            protocol_matching_rules: record.protocol_matching_rules,
            stages: record.stages,
        };
        protocol.update_number_of_priors_referenced();
        protocol
    }
}

impl Protocol {
    /// Create an empty, unlocked protocol with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(new_id(), name)
    }

    /// Create an empty protocol with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            locked: false,
            created_date: now,
            modified_date: now,
            created_by: None,
            modified_by: None,
            number_of_priors_referenced: 0,
            protocol_matching_rules: Vec::new(),
            stages: Vec::new(),
        }
    }

    /// The locked fallback protocol: one 1x1 grid stage without rules.
    pub fn default_protocol() -> Self {
        let mut protocol = Self::with_id(DEFAULT_PROTOCOL_ID, "Default");
        protocol.locked = true;
        protocol.stages.push(Stage::new(
            "oneByOne",
            ViewportStructure::grid(1, 1).unwrap_or_default(),
        ));
        protocol
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn number_of_priors_referenced(&self) -> u32 {
        self.number_of_priors_referenced
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn stage_mut(&mut self, index: usize) -> Option<&mut Stage> {
        self.stages.get_mut(index)
    }

    /// "Save As": a copy with a fresh id that is never locked.
    pub fn create_clone(&self, name: Option<&str>) -> Self {
        let mut clone = self.clone();
        clone.id = new_id();
        clone.locked = false;
        let now = Utc::now();
        clone.created_date = now;
        clone.modified_date = now;
        if let Some(name) = name {
            clone.name = name.to_string();
        }
        clone
    }

    /// Recompute the highest prior index referenced by any study rule.
    pub fn update_number_of_priors_referenced(&mut self) {
        self.number_of_priors_referenced = self
            .stages
            .iter()
            .flat_map(|stage| &stage.viewports)
            .flat_map(|viewport| &viewport.study_matching_rules)
            .filter_map(Rule::abstract_prior_index)
            .filter(|index| *index > 0)
            .max()
            .map_or(0, |index| u32::try_from(index).unwrap_or(u32::MAX));
    }

    /// Bookkeeping after any edit: modification stamp and derived fields.
    pub fn protocol_was_modified(&mut self, user: Option<&str>) {
        if let Some(user) = user {
            self.modified_by = Some(user.to_string());
        }
        self.update_number_of_priors_referenced();
        self.modified_date = Utc::now();
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
        self.protocol_was_modified(None);
    }

    pub fn add_protocol_matching_rule(&mut self, rule: Rule) {
        self.protocol_matching_rules.push(rule);
        self.protocol_was_modified(None);
    }

    /// Remove the first protocol rule equal to `rule`.
    pub fn remove_protocol_matching_rule(&mut self, rule: &Rule) -> bool {
        let Some(index) = self.protocol_matching_rules.iter().position(|r| r == rule) else {
            return false;
        };
        self.protocol_matching_rules.remove(index);
        self.protocol_was_modified(None);
        true
    }

    /// Check the invariants required before the protocol can be displayed.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ModelError::EmptyProtocolId);
        }
        if self.stages.is_empty() {
            return Err(ModelError::NoStages {
                protocol_id: self.id.clone(),
            });
        }
        for stage in &self.stages {
            stage.viewport_structure.validate()?;
        }
        Ok(())
    }
}
