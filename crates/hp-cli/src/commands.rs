use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use hp_engine::{EngineConfig, ProtocolEngine, ProtocolRank, ViewportBinding};
use hp_match::{ComparatorRegistry, StudyMetadataProvider};
use hp_model::{Protocol, Rule, RuleLevel, StudySet};
use hp_store::import_protocols;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::cli::{MatchArgs, ProtocolsArgs};
use crate::logging::redact_value;

/// Outcome of `match`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub ranking: Vec<ProtocolRank>,
    pub selected_protocol: String,
    /// No protocol was acceptable; the default protocol is shown.
    pub fallback: bool,
    pub stage_index: usize,
    pub stage_count: usize,
    pub bindings: Vec<ViewportBinding>,
}

/// One row of `protocols`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRow {
    pub id: String,
    pub name: String,
    pub locked: bool,
    pub stages: usize,
    pub priors_referenced: u32,
}

/// A problem found by `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIssue {
    pub protocol_id: String,
    /// Where the problem sits, e.g. `stage 0 / viewport 1 / series rule 2`.
    pub location: String,
    pub message: String,
}

pub fn load_protocols(path: &Path) -> Result<Vec<Protocol>> {
    import_protocols(path).map_err(|error| {
        let message = match error.suggestion() {
            Some(hint) => format!("{} ({hint})", error.user_message()),
            None => error.user_message(),
        };
        anyhow::Error::new(error).context(message)
    })
}

pub fn load_studies(path: &Path) -> Result<StudySet> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read study set {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse study set {}", path.display()))
}

pub fn run_match(args: &MatchArgs) -> Result<MatchReport> {
    let protocols = load_protocols(&args.protocols)?;
    let studies = load_studies(&args.studies)?;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).context("load engine config")?,
        None => EngineConfig::default(),
    };

    let span = info_span!(
        "match",
        study = redact_value(&studies.current.study_instance_uid),
        priors = studies.prior_count()
    );
    let _guard = span.enter();

    let mut engine = ProtocolEngine::new(studies, StudyMetadataProvider::new()).with_config(config);
    let ranking = engine.rank_protocols(&protocols);
    let fallback = !ranking.iter().any(|rank| rank.acceptable);
    engine.reset(&protocols).context("activate protocol")?;

    if args.stage > 0 && !engine.set_stage(args.stage) {
        warn!(stage = args.stage, "requested stage does not exist, showing stage 0");
    }
    let selected_protocol = engine
        .protocol()
        .map(|p| p.id().to_string())
        .unwrap_or_default();
    info!(protocol_id = %selected_protocol, fallback, "match complete");

    Ok(MatchReport {
        ranking,
        selected_protocol,
        fallback,
        stage_index: engine.state().active_stage_index,
        stage_count: engine.protocol().map_or(0, |p| p.stages.len()),
        bindings: engine.bindings().to_vec(),
    })
}

pub fn run_protocols(args: &ProtocolsArgs) -> Result<Vec<ProtocolRow>> {
    let protocols = load_protocols(&args.protocols)?;
    Ok(protocols
        .iter()
        .map(|protocol| ProtocolRow {
            id: protocol.id().to_string(),
            name: protocol.name.clone(),
            locked: protocol.locked,
            stages: protocol.stages.len(),
            priors_referenced: protocol.number_of_priors_referenced(),
        })
        .collect())
}

pub fn run_check(args: &ProtocolsArgs) -> Result<Vec<CheckIssue>> {
    let protocols = load_protocols(&args.protocols)?;
    let registry = ComparatorRegistry::with_builtins();
    let issues: Vec<CheckIssue> = protocols
        .iter()
        .flat_map(|protocol| check_protocol(protocol, &registry))
        .collect();
    info!(protocols = protocols.len(), issues = issues.len(), "check complete");
    Ok(issues)
}

/// Problems that make a protocol misbehave at display time.
pub fn check_protocol(protocol: &Protocol, registry: &ComparatorRegistry) -> Vec<CheckIssue> {
    let mut issues = Vec::new();
    let mut push = |location: String, message: String| {
        issues.push(CheckIssue {
            protocol_id: protocol.id().to_string(),
            location,
            message,
        });
    };

    if let Err(error) = protocol.validate() {
        push("protocol".to_string(), error.to_string());
    }
    for (location, rule) in labelled_rules(protocol) {
        let checked = registry
            .resolve_constraint(&rule.constraint)
            .and_then(|comparator| comparator.kind.validate_operand(&rule.constraint.operand));
        if let Err(error) = checked {
            push(location, error.to_string());
        }
    }
    for (index, stage) in protocol.stages.iter().enumerate() {
        if !stage.is_consistent() {
            push(
                format!("stage {index}"),
                format!(
                    "{} viewports for a layout of {}",
                    stage.viewports.len(),
                    stage.viewport_structure.viewport_count()
                ),
            );
        }
    }
    issues
}

fn labelled_rules(protocol: &Protocol) -> Vec<(String, &Rule)> {
    let mut rules: Vec<(String, &Rule)> = protocol
        .protocol_matching_rules
        .iter()
        .enumerate()
        .map(|(index, rule)| (format!("protocol rule {index}"), rule))
        .collect();
    for (stage_index, stage) in protocol.stages.iter().enumerate() {
        for (viewport_index, viewport) in stage.viewports.iter().enumerate() {
            for level in [RuleLevel::Study, RuleLevel::Series, RuleLevel::Image] {
                rules.extend(viewport.rules(level).iter().enumerate().map(|(index, rule)| {
                    (
                        format!(
                            "stage {stage_index} / viewport {viewport_index} / {} rule {index}",
                            level.as_str()
                        ),
                        rule,
                    )
                }));
            }
        }
    }
    rules
}
