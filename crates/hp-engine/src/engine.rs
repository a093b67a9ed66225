//! The protocol engine: owns the active protocol and stage and runs the
//! reconcile and assignment pipeline on every trigger.
//!
//! Operations run to completion before returning and take `&mut self`, so
//! one engine instance is never re-entered. Share it across threads behind a
//! mutex.

use hp_match::{Matcher, MetadataProvider};
use hp_model::{Protocol, Stage, Study, StudySet, ViewportStructure};
use hp_store::ProtocolStore;
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::assignment::{Assignment, AssignmentOptions, ViewportBinding, ViewportMatchDetails, assign};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::layout::{ReconcileChange, reconcile};
use crate::selector::{ProtocolRank, rank_protocols, select_best_protocol};
use crate::surface::RenderSurface;

/// Navigation state of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub active_protocol_id: Option<String>,
    pub active_stage_index: usize,
    /// Viewport focused by an authoring surface; does not affect assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_viewport_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    NoProtocol,
    ProtocolActive {
        protocol_id: String,
        stage_index: usize,
    },
}

/// Hanging protocol engine for one viewer session.
#[derive(Debug)]
pub struct ProtocolEngine<P> {
    matcher: Matcher,
    provider: P,
    config: EngineConfig,
    studies: StudySet,
    state: EngineState,
    protocol: Option<Protocol>,
    assignment: Assignment,
}

impl<P: MetadataProvider> ProtocolEngine<P> {
    pub fn new(studies: StudySet, provider: P) -> Self {
        Self {
            matcher: Matcher::default(),
            provider,
            config: EngineConfig::default(),
            studies,
            state: EngineState::default(),
            protocol: None,
            assignment: Assignment::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn studies(&self) -> &StudySet {
        &self.studies
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn status(&self) -> EngineStatus {
        match &self.protocol {
            None => EngineStatus::NoProtocol,
            Some(protocol) => EngineStatus::ProtocolActive {
                protocol_id: protocol.id().to_string(),
                stage_index: self.state.active_stage_index,
            },
        }
    }

    /// The active protocol, including any reconciliation applied to it.
    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.protocol
            .as_ref()
            .and_then(|p| p.stage(self.state.active_stage_index))
    }

    /// Bindings of the last assignment run, in viewport order.
    pub fn bindings(&self) -> &[ViewportBinding] {
        &self.assignment.bindings
    }

    /// Per-viewport evaluation details of the last assignment run.
    pub fn match_details(&self) -> &[ViewportMatchDetails] {
        &self.assignment.details
    }

    /// Rank `protocols` against the current studies without changing state.
    pub fn rank_protocols(&self, protocols: &[Protocol]) -> Vec<ProtocolRank> {
        rank_protocols(
            protocols,
            &self.studies,
            &self.matcher,
            &self.provider,
            &self.config,
        )
    }

    /// Make `protocol` active at its first stage and run the pipeline.
    pub fn set_hanging_protocol(&mut self, protocol: Protocol) -> Result<&[ViewportBinding]> {
        protocol.validate()?;
        info!(protocol_id = protocol.id(), name = %protocol.name, "hanging protocol set");
        self.state = EngineState {
            active_protocol_id: Some(protocol.id().to_string()),
            active_stage_index: 0,
            active_viewport_index: None,
        };
        self.protocol = Some(protocol);
        self.run_pipeline();
        Ok(self.bindings())
    }

    /// Select the best of `protocols` for the current studies and activate it.
    pub fn reset(&mut self, protocols: &[Protocol]) -> Result<&[ViewportBinding]> {
        let selection = select_best_protocol(
            protocols,
            &self.studies,
            &self.matcher,
            &self.provider,
            &self.config,
        );
        self.set_hanging_protocol(selection.protocol)
    }

    /// [`Self::reset`] over every protocol of a store.
    pub fn reset_from_store(&mut self, store: &dyn ProtocolStore) -> Result<&[ViewportBinding]> {
        let protocols = store.all()?;
        self.reset(&protocols)
    }

    fn stage_count(&self) -> usize {
        self.protocol.as_ref().map_or(0, |p| p.stages.len())
    }

    pub fn is_next_stage_available(&self) -> bool {
        self.state.active_stage_index + 1 < self.stage_count()
    }

    pub fn is_previous_stage_available(&self) -> bool {
        self.protocol.is_some() && self.state.active_stage_index > 0
    }

    /// Move to stage `index`. Out-of-range requests are ignored.
    pub fn set_stage(&mut self, index: usize) -> bool {
        if index >= self.stage_count() {
            debug!(index, stages = self.stage_count(), "stage index out of range");
            return false;
        }
        if index != self.state.active_stage_index {
            info!(stage = index, "stage changed");
        }
        self.state.active_stage_index = index;
        self.state.active_viewport_index = None;
        self.run_pipeline();
        true
    }

    pub fn next_stage(&mut self) -> bool {
        if !self.is_next_stage_available() {
            return false;
        }
        self.set_stage(self.state.active_stage_index + 1)
    }

    pub fn previous_stage(&mut self) -> bool {
        if !self.is_previous_stage_available() {
            return false;
        }
        self.set_stage(self.state.active_stage_index - 1)
    }

    /// Re-run reconciliation and assignment for the current stage.
    ///
    /// Idempotent; without an active protocol this does nothing.
    pub fn update_viewports(&mut self, focused_viewport: Option<usize>) -> &[ViewportBinding] {
        if focused_viewport.is_some() {
            self.state.active_viewport_index = focused_viewport;
        }
        self.run_pipeline();
        self.bindings()
    }

    pub fn set_active_viewport(&mut self, index: Option<usize>) {
        self.state.active_viewport_index = index;
    }

    /// Change the grid of the current stage and re-run the pipeline.
    pub fn set_layout(&mut self, rows: u32, columns: u32) -> Result<&[ViewportBinding]> {
        let structure = ViewportStructure::grid(rows, columns)?;
        let viewport_count = structure.viewport_count();
        let stage_index = self.state.active_stage_index;
        let stage = self
            .protocol
            .as_mut()
            .and_then(|p| p.stage_mut(stage_index))
            .ok_or(EngineError::NoActiveProtocol)?;
        stage.viewport_structure = structure;
        if let Some(focused) = self.state.active_viewport_index
            && focused >= viewport_count
        {
            self.state.active_viewport_index = None;
        }
        self.run_pipeline();
        Ok(self.bindings())
    }

    /// Apply an authoring edit to the active protocol.
    ///
    /// Locked protocols are refused. An edit leaving the protocol invalid is
    /// rolled back.
    pub fn modify_protocol(
        &mut self,
        user: Option<&str>,
        edit: impl FnOnce(&mut Protocol),
    ) -> Result<&[ViewportBinding]> {
        let protocol = self.protocol.as_mut().ok_or(EngineError::NoActiveProtocol)?;
        if protocol.locked {
            return Err(EngineError::ProtocolLocked {
                id: protocol.id().to_string(),
            });
        }
        let before = protocol.clone();
        edit(&mut *protocol);
        protocol.protocol_was_modified(user);
        if let Err(error) = protocol.validate() {
            *protocol = before;
            return Err(error.into());
        }
        let last_stage = protocol.stages.len().saturating_sub(1);
        self.state.active_stage_index = self.state.active_stage_index.min(last_stage);
        self.run_pipeline();
        Ok(self.bindings())
    }

    /// Replace the patient's studies and re-run assignment.
    pub fn set_studies(&mut self, studies: StudySet) {
        self.studies = studies;
        self.run_pipeline();
    }

    /// Add a prior that finished loading; re-runs assignment when it is new.
    pub fn add_prior_study(&mut self, study: Study) -> bool {
        let added = self.studies.push_prior(study);
        if added {
            debug!(priors = self.studies.prior_count(), "prior study added");
            self.run_pipeline();
        }
        added
    }

    /// Fetch priors of the current patient from the metadata provider.
    ///
    /// Returns the number of new priors.
    pub fn load_priors(&mut self) -> usize {
        let Some(patient_id) = self.studies.current.patient_id.clone() else {
            return 0;
        };
        let before = self.studies.current.study_date;
        let mut added = 0;
        for study in self.provider.prior_studies(&patient_id, before) {
            if self.studies.push_prior(study) {
                added += 1;
            }
        }
        if added > 0 {
            info!(added, "prior studies loaded");
            self.run_pipeline();
        }
        added
    }

    /// Push the current layout and bindings to a rendering surface. With a
    /// focused viewport only that viewport's data is sent.
    pub fn publish(&self, surface: &mut dyn RenderSurface, focused_viewport: Option<usize>) {
        let Some(stage) = self.current_stage() else {
            return;
        };
        match focused_viewport {
            Some(index) => {
                if let Some(binding) = self.assignment.bindings.get(index) {
                    surface.set_viewport_data(binding);
                }
            }
            None => {
                surface.set_layout(&stage.viewport_structure, stage.viewports.len());
                for binding in &self.assignment.bindings {
                    surface.set_viewport_data(binding);
                }
            }
        }
    }

    fn run_pipeline(&mut self) {
        let stage_index = self.state.active_stage_index;
        let Some(protocol) = self.protocol.as_mut() else {
            self.assignment = Assignment::default();
            return;
        };
        let span = info_span!("update_viewports", protocol_id = protocol.id(), stage = stage_index);
        let _enter = span.enter();

        let Some(stage) = protocol.stage_mut(stage_index) else {
            self.assignment = Assignment::default();
            return;
        };
        match reconcile(stage) {
            ReconcileChange::Unchanged => {}
            change => debug!(?change, viewports = stage.viewports.len(), "stage reconciled"),
        }

        let options = AssignmentOptions {
            distinct_series: self.config.distinct_series,
        };
        self.assignment = assign(stage, &self.studies, &self.matcher, &self.provider, options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hp_match::StudyMetadataProvider;
    use hp_model::{Series, ViewportStructure};

    fn engine() -> ProtocolEngine<StudyMetadataProvider> {
        let study = Study::new("s").with_series(Series::new("s.1"));
        ProtocolEngine::new(StudySet::current_only(study), StudyMetadataProvider::new())
    }

    fn three_stage_protocol() -> Protocol {
        let mut protocol = Protocol::with_id("p", "Three stages");
        for (rows, cols) in [(1, 1), (1, 2), (2, 2)] {
            protocol.add_stage(Stage::new(
                format!("{rows}x{cols}"),
                ViewportStructure::grid(rows, cols).unwrap(),
            ));
        }
        protocol
    }

    #[test]
    fn starts_without_protocol() {
        let mut engine = engine();
        assert_eq!(engine.status(), EngineStatus::NoProtocol);
        assert!(engine.update_viewports(None).is_empty());
        assert!(!engine.next_stage());
        assert!(matches!(engine.set_layout(1, 2), Err(EngineError::NoActiveProtocol)));
    }

    #[test]
    fn oversized_layout_is_refused_without_changing_state() {
        let mut engine = engine();
        engine.set_hanging_protocol(three_stage_protocol()).unwrap();
        engine.set_active_viewport(Some(0));

        let result = engine.set_layout(65_536, 65_536);
        assert!(matches!(
            result,
            Err(EngineError::Model(hp_model::ModelError::LayoutTooLarge { .. }))
        ));
        assert_eq!(engine.state().active_viewport_index, Some(0));
        assert_eq!(engine.bindings().len(), 1);

        let mut oversized = three_stage_protocol();
        oversized.stages[0].viewport_structure.properties.rows = 100_000;
        oversized.stages[0].viewport_structure.properties.columns = 100_000;
        assert!(engine.set_hanging_protocol(oversized).is_err());
        assert_eq!(engine.bindings().len(), 1);
    }

    #[test]
    fn stage_navigation_is_clamped() {
        let mut engine = engine();
        engine.set_hanging_protocol(three_stage_protocol()).unwrap();
        assert!(!engine.is_previous_stage_available());
        assert!(!engine.previous_stage());

        assert!(engine.next_stage());
        assert!(engine.next_stage());
        assert_eq!(engine.bindings().len(), 4);
        assert!(!engine.is_next_stage_available());
        assert!(!engine.next_stage());
        assert!(!engine.set_stage(7));
        assert_eq!(
            engine.status(),
            EngineStatus::ProtocolActive {
                protocol_id: "p".into(),
                stage_index: 2
            }
        );
    }

    #[test]
    fn invalid_protocol_is_rejected() {
        let mut engine = engine();
        let result = engine.set_hanging_protocol(Protocol::with_id("p", "No stages"));
        assert!(matches!(result, Err(EngineError::Model(_))));
        assert_eq!(engine.status(), EngineStatus::NoProtocol);
    }

    #[test]
    fn locked_protocols_cannot_be_modified() {
        let mut engine = engine();
        engine.set_hanging_protocol(Protocol::default_protocol()).unwrap();
        let result = engine.modify_protocol(Some("tech"), |p| p.name = "Edited".into());
        assert!(matches!(result, Err(EngineError::ProtocolLocked { .. })));
    }

    #[test]
    fn invalid_edits_are_rolled_back() {
        let mut engine = engine();
        engine.set_hanging_protocol(three_stage_protocol()).unwrap();
        let result = engine.modify_protocol(None, |p| p.stages.clear());
        assert!(matches!(result, Err(EngineError::Model(_))));
        assert_eq!(engine.protocol().unwrap().stages.len(), 3);
    }

    #[test]
    fn removing_stages_clamps_active_index() {
        let mut engine = engine();
        engine.set_hanging_protocol(three_stage_protocol()).unwrap();
        engine.set_stage(2);
        engine
            .modify_protocol(Some("tech"), |p| p.stages.truncate(1))
            .unwrap();
        assert_eq!(engine.state().active_stage_index, 0);
        assert_eq!(engine.protocol().unwrap().modified_by.as_deref(), Some("tech"));
    }
}
