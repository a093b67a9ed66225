//! Viewport assignment: binds a study, series and instance to each viewport.
//!
//! Each level is ranked only within the winner of the level above, so the
//! cost is linear in the number of studies, series and instances.

use std::collections::{BTreeMap, HashSet};

use hp_match::{MatchContext, MatchOutcome, Matcher, MetadataProvider, Ranked, rank};
use hp_model::{AttributeValue, RuleLevel, Series, Stage, Study, StudySet, Viewport};
use serde::Serialize;
use tracing::debug;

/// What is shown in one viewport. Unset ids mean the level did not match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportBinding {
    pub viewport_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Display settings of the viewport, with YES/NO as booleans.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingStatus {
    /// No study matched; the viewport is shown empty.
    Empty,
    /// Bound down to the study or series level only.
    Partial,
    Complete,
}

impl ViewportBinding {
    pub fn unbound(viewport_index: usize) -> Self {
        Self {
            viewport_index,
            study_id: None,
            series_id: None,
            instance_id: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> BindingStatus {
        match (&self.study_id, &self.series_id, &self.instance_id) {
            (None, _, _) => BindingStatus::Empty,
            (Some(_), Some(_), Some(_)) => BindingStatus::Complete,
            _ => BindingStatus::Partial,
        }
    }
}

/// Winning evaluations per level, kept for authoring feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMatchDetails {
    pub study: Option<MatchOutcome>,
    pub series: Option<MatchOutcome>,
    pub image: Option<MatchOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentOptions {
    /// Prefer a series not yet bound to an earlier viewport of the stage.
    pub distinct_series: bool,
}

/// Result of one assignment run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    pub bindings: Vec<ViewportBinding>,
    pub details: Vec<ViewportMatchDetails>,
}

/// Bind every viewport of `stage`, in declaration order.
pub fn assign(
    stage: &Stage,
    studies: &StudySet,
    matcher: &Matcher,
    provider: &dyn MetadataProvider,
    options: AssignmentOptions,
) -> Assignment {
    let mut assignment = Assignment::default();
    let mut used_series: HashSet<(String, String)> = HashSet::new();

    for (index, viewport) in stage.viewports.iter().enumerate() {
        let (binding, details) = assign_viewport(
            index,
            viewport,
            studies,
            matcher,
            provider,
            options,
            &mut used_series,
        );
        debug!(
            viewport_index = index,
            status = ?binding.status(),
            study = binding.study_id.as_deref().unwrap_or("-"),
            series = binding.series_id.as_deref().unwrap_or("-"),
            "viewport assigned"
        );
        assignment.bindings.push(binding);
        assignment.details.push(details);
    }
    assignment
}

/// Studies the viewport may bind to, each with the abstract prior value its
/// study rules should see.
fn candidate_studies<'a>(viewport: &Viewport, studies: &'a StudySet) -> Vec<(i64, &'a Study)> {
    let requested = viewport
        .study_matching_rules
        .iter()
        .find_map(hp_model::Rule::abstract_prior_index);
    match requested {
        // The requested value is reported as is, so -1 (oldest) still
        // satisfies its own rule.
        Some(value) => studies
            .by_abstract_prior(value)
            .map(|study| vec![(value, study)])
            .unwrap_or_default(),
        None => studies.iter().collect(),
    }
}

fn assign_viewport(
    index: usize,
    viewport: &Viewport,
    studies: &StudySet,
    matcher: &Matcher,
    provider: &dyn MetadataProvider,
    options: AssignmentOptions,
    used_series: &mut HashSet<(String, String)>,
) -> (ViewportBinding, ViewportMatchDetails) {
    let mut binding = ViewportBinding::unbound(index);
    binding.settings = viewport.display_settings();
    let mut details = ViewportMatchDetails::default();

    let study_rules = viewport.rules(RuleLevel::Study);
    let study_candidates = candidate_studies(viewport, studies).into_iter().map(|(prior, study)| {
        let ctx = MatchContext::for_study(study)
            .with_studies(studies)
            .with_prior_index(prior);
        ((prior, study), matcher.evaluate(study_rules, &ctx, provider))
    });
    let Some(winner) = rank(study_candidates).into_iter().next() else {
        return (binding, details);
    };
    let (prior, study) = winner.item;
    binding.study_id = Some(study.study_instance_uid.clone());
    details.study = Some(winner.outcome);

    let series_rules = viewport.rules(RuleLevel::Series);
    let series_candidates = study.series.iter().map(|series| {
        let ctx = MatchContext::for_study(study)
            .with_studies(studies)
            .with_prior_index(prior)
            .with_series(series);
        (series, matcher.evaluate(series_rules, &ctx, provider))
    });
    let ranked_series = rank(series_candidates);
    let Some(series) = pick_series(ranked_series, study, options, used_series) else {
        return (binding, details);
    };
    binding.series_id = Some(series.item.series_instance_uid.clone());
    details.series = Some(series.outcome);
    let series = series.item;

    let image_rules = viewport.rules(RuleLevel::Image);
    let instance_candidates = series.instances.iter().filter(|i| i.is_image()).map(|instance| {
        let ctx = MatchContext::for_study(study)
            .with_studies(studies)
            .with_prior_index(prior)
            .with_series(series)
            .with_instance(instance);
        (instance, matcher.evaluate(image_rules, &ctx, provider))
    });
    if let Some(instance) = rank(instance_candidates).into_iter().next() {
        binding.instance_id = Some(instance.item.sop_instance_uid.clone());
        details.image = Some(instance.outcome);
    }

    (binding, details)
}

/// The best series, or with `distinct_series` the best one not already
/// shown. Falls back to the best series when every candidate is in use.
fn pick_series<'a>(
    ranked: Vec<Ranked<&'a Series>>,
    study: &Study,
    options: AssignmentOptions,
    used_series: &mut HashSet<(String, String)>,
) -> Option<Ranked<&'a Series>> {
    let key = |series: &Series| {
        (
            study.study_instance_uid.clone(),
            series.series_instance_uid.clone(),
        )
    };
    let position = if options.distinct_series {
        ranked
            .iter()
            .position(|r| !used_series.contains(&key(r.item)))
            .unwrap_or(0)
    } else {
        0
    };
    let chosen = ranked.into_iter().nth(position)?;
    used_series.insert(key(chosen.item));
    Some(chosen)
}
