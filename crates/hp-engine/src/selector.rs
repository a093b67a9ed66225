//! Protocol selection.

use hp_match::{MatchContext, MatchOutcome, Matcher, MetadataProvider, order, rank};
use hp_model::{Protocol, StudySet};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;

/// One row of the protocol ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRank {
    /// Position of the protocol in the input list.
    pub position: usize,
    pub protocol_id: String,
    pub name: String,
    pub score: u32,
    pub required_satisfied: usize,
    /// All required rules held and enough priors are available.
    pub acceptable: bool,
    /// The protocol references more priors than the patient has.
    pub missing_priors: bool,
    #[serde(skip)]
    pub outcome: MatchOutcome,
}

/// The selector's decision.
#[derive(Debug, Clone)]
pub struct Selection {
    pub protocol: Protocol,
    /// `None` for the fallback protocol.
    pub outcome: Option<MatchOutcome>,
    pub fallback: bool,
}

fn missing_priors(protocol: &Protocol, studies: &StudySet, config: &EngineConfig) -> bool {
    config.require_available_priors
        && protocol.number_of_priors_referenced() as usize > studies.prior_count()
}

fn evaluate_all(
    protocols: &[Protocol],
    studies: &StudySet,
    matcher: &Matcher,
    provider: &dyn MetadataProvider,
) -> Vec<MatchOutcome> {
    let context = MatchContext::for_study(&studies.current)
        .with_studies(studies)
        .with_prior_index(0);
    protocols
        .iter()
        .map(|protocol| {
            let outcome = matcher.evaluate(&protocol.protocol_matching_rules, &context, provider);
            debug!(
                protocol_id = protocol.id(),
                score = outcome.score,
                all_required_satisfied = outcome.all_required_satisfied,
                "protocol evaluated"
            );
            outcome
        })
        .collect()
}

/// Every protocol with its evaluation, best first; unacceptable protocols
/// are listed after the acceptable ones.
pub fn rank_protocols(
    protocols: &[Protocol],
    studies: &StudySet,
    matcher: &Matcher,
    provider: &dyn MetadataProvider,
    config: &EngineConfig,
) -> Vec<ProtocolRank> {
    let outcomes = evaluate_all(protocols, studies, matcher, provider);
    let candidates = protocols.iter().zip(outcomes).map(|(protocol, mut outcome)| {
        if missing_priors(protocol, studies, config) {
            outcome.all_required_satisfied = false;
        }
        (protocol, outcome)
    });
    order(candidates)
        .into_iter()
        .map(|ranked| ProtocolRank {
            position: ranked.position,
            protocol_id: ranked.item.id().to_string(),
            name: ranked.item.name.clone(),
            score: ranked.outcome.score,
            required_satisfied: ranked.outcome.required_satisfied,
            acceptable: ranked.outcome.all_required_satisfied,
            missing_priors: missing_priors(ranked.item, studies, config),
            outcome: ranked.outcome,
        })
        .collect()
}

/// Pick the best acceptable protocol, or the default protocol when none is.
pub fn select_best_protocol(
    protocols: &[Protocol],
    studies: &StudySet,
    matcher: &Matcher,
    provider: &dyn MetadataProvider,
    config: &EngineConfig,
) -> Selection {
    let outcomes = evaluate_all(protocols, studies, matcher, provider);
    let candidates = protocols
        .iter()
        .zip(outcomes)
        .filter(|(protocol, _)| {
            let skip = missing_priors(protocol, studies, config);
            if skip {
                debug!(
                    protocol_id = protocol.id(),
                    priors_referenced = protocol.number_of_priors_referenced(),
                    priors_available = studies.prior_count(),
                    "protocol skipped: not enough priors"
                );
            }
            !skip
        });

    if let Some(winner) = rank(candidates).into_iter().next() {
        info!(
            protocol_id = winner.item.id(),
            score = winner.outcome.score,
            "protocol selected"
        );
        return Selection {
            protocol: winner.item.clone(),
            outcome: Some(winner.outcome),
            fallback: false,
        };
    }

    let protocol = protocols
        .iter()
        .find(|p| p.id() == config.default_protocol_id)
        .cloned()
        .unwrap_or_else(Protocol::default_protocol);
    info!(protocol_id = protocol.id(), "no protocol matched, using default");
    Selection {
        protocol,
        outcome: None,
        fallback: true,
    }
}
