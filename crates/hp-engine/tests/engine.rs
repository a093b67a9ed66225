//! End-to-end behaviour of the protocol engine.

use chrono::NaiveDate;
use hp_engine::{
    BindingStatus, EngineConfig, EngineStatus, ProtocolEngine, RenderSurface, ViewportBinding,
};
use hp_match::StudyMetadataProvider;
use hp_model::{
    AttributeValue, Constraint, Instance, Protocol, Rule, RuleLevel, Series, Stage, Study, StudySet, Viewport,
    ViewportStructure,
};
use hp_store::{MemoryProtocolStore, ProtocolStore};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ct_study(uid: &str, on: NaiveDate) -> Study {
    Study::new(uid)
        .with_patient("PAT-1")
        .with_date(on)
        .with_attribute("StudyDescription", "CT CHEST")
        .with_series(
            Series::new(format!("{uid}.1"))
                .with_attribute("Modality", "CT")
                .with_attribute("SeriesDescription", "AXIAL 5mm")
                .with_instance(Instance::new(format!("{uid}.1.1")).with_attribute("InstanceNumber", 1))
                .with_instance(Instance::new(format!("{uid}.1.2")).with_attribute("InstanceNumber", 2)),
        )
}

fn viewport_for_prior(prior: i64) -> Viewport {
    let mut viewport = Viewport::new();
    viewport.add_rule(RuleLevel::Study, Rule::abstract_prior(prior));
    viewport.add_rule(
        RuleLevel::Series,
        Rule::new("Modality", Constraint::equals("CT")).required(),
    );
    viewport
}

fn comparison_protocol() -> Protocol {
    let mut protocol = Protocol::with_id("ct-compare", "CT current vs prior");
    protocol.add_protocol_matching_rule(Rule::new("Modality", Constraint::equals("CT")).required());
    protocol.add_stage(
        Stage::new("side by side", ViewportStructure::grid(1, 2).unwrap())
            .with_viewports(vec![viewport_for_prior(0), viewport_for_prior(1)]),
    );
    protocol
}

fn current_and_prior() -> StudySet {
    StudySet::new(
        ct_study("1.2.3", date(2024, 3, 1)),
        vec![ct_study("1.2.2", date(2023, 1, 15))],
    )
}

#[derive(Default)]
struct RecordingSurface {
    layouts: Vec<usize>,
    updates: Vec<ViewportBinding>,
}

impl RenderSurface for RecordingSurface {
    fn set_layout(&mut self, _structure: &ViewportStructure, viewport_count: usize) {
        self.layouts.push(viewport_count);
    }

    fn set_viewport_data(&mut self, binding: &ViewportBinding) {
        self.updates.push(binding.clone());
    }
}

#[test]
fn current_and_prior_bind_side_by_side() {
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    let bindings = engine.set_hanging_protocol(comparison_protocol()).unwrap();

    insta::assert_json_snapshot!(bindings, @r#"
    [
      {
        "viewportIndex": 0,
        "studyId": "1.2.3",
        "seriesId": "1.2.3.1",
        "instanceId": "1.2.3.1.1"
      },
      {
        "viewportIndex": 1,
        "studyId": "1.2.2",
        "seriesId": "1.2.2.1",
        "instanceId": "1.2.2.1.1"
      }
    ]
    "#);
}

#[test]
fn reset_selects_protocol_and_falls_back_without_priors() {
    let protocols = vec![Protocol::default_protocol(), comparison_protocol()];

    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.reset(&protocols).unwrap();
    assert_eq!(engine.state().active_protocol_id.as_deref(), Some("ct-compare"));

    let alone = StudySet::current_only(ct_study("1.2.3", date(2024, 3, 1)));
    let mut engine = ProtocolEngine::new(alone, StudyMetadataProvider::new());
    engine.reset(&protocols).unwrap();
    assert_eq!(
        engine.status(),
        EngineStatus::ProtocolActive {
            protocol_id: hp_model::DEFAULT_PROTOCOL_ID.into(),
            stage_index: 0
        }
    );
    assert_eq!(engine.bindings().len(), 1);
}

#[test]
fn late_priors_fill_empty_viewports() {
    let current = ct_study("1.2.3", date(2024, 3, 1));
    let mut engine = ProtocolEngine::new(StudySet::current_only(current), StudyMetadataProvider::new())
        .with_config(EngineConfig {
            require_available_priors: false,
            ..EngineConfig::default()
        });
    engine.set_hanging_protocol(comparison_protocol()).unwrap();
    assert_eq!(engine.bindings()[1].status(), BindingStatus::Empty);

    assert!(engine.add_prior_study(ct_study("1.2.2", date(2023, 1, 15))));
    assert_eq!(engine.bindings()[1].study_id.as_deref(), Some("1.2.2"));
    assert_eq!(engine.bindings()[1].status(), BindingStatus::Complete);
    assert!(!engine.add_prior_study(ct_study("1.2.2", date(2023, 1, 15))));
}

#[test]
fn priors_load_from_the_metadata_provider() {
    let provider = StudyMetadataProvider::new().with_archive(vec![
        ct_study("1.2.1", date(2021, 6, 1)),
        ct_study("1.2.2", date(2023, 1, 15)),
        ct_study("1.2.9", date(2025, 1, 1)),
    ]);
    let current = ct_study("1.2.3", date(2024, 3, 1));
    let mut engine = ProtocolEngine::new(StudySet::current_only(current), provider);

    assert_eq!(engine.load_priors(), 2);
    assert_eq!(engine.studies().prior(1).unwrap().study_instance_uid, "1.2.2");
    assert_eq!(engine.load_priors(), 0);
}

#[test]
fn oldest_prior_is_addressed_by_minus_one() {
    let studies = StudySet::new(
        ct_study("1.2.3", date(2024, 3, 1)),
        vec![ct_study("1.2.2", date(2023, 1, 15)), ct_study("1.2.1", date(2021, 6, 1))],
    );
    let mut protocol = Protocol::with_id("oldest", "Current vs baseline");
    protocol.add_stage(
        Stage::new("baseline", ViewportStructure::grid(1, 2).unwrap())
            .with_viewports(vec![viewport_for_prior(0), viewport_for_prior(-1)]),
    );
    let mut engine = ProtocolEngine::new(studies, StudyMetadataProvider::new());
    let bindings = engine.set_hanging_protocol(protocol).unwrap();
    assert_eq!(bindings[1].study_id.as_deref(), Some("1.2.1"));
}

#[test]
fn update_viewports_is_idempotent() {
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.set_hanging_protocol(comparison_protocol()).unwrap();
    let first = engine.update_viewports(None).to_vec();
    let second = engine.update_viewports(None).to_vec();
    assert_eq!(first, second);
    assert_eq!(engine.protocol().unwrap().stages[0].viewports.len(), 2);
}

#[test]
fn layout_changes_shrink_and_grow_the_stage() {
    let tagged = |tag: &str| {
        let mut viewport = Viewport::new();
        viewport.add_rule(
            RuleLevel::Series,
            Rule::new("SeriesDescription", Constraint::contains(tag)),
        );
        viewport
    };
    let mut protocol = Protocol::with_id("grid", "Grid");
    protocol.add_stage(
        Stage::new("2x2", ViewportStructure::grid(2, 2).unwrap())
            .with_viewports(vec![tagged("A"), tagged("B"), tagged("C"), tagged("D")]),
    );
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.set_hanging_protocol(protocol).unwrap();

    assert_eq!(engine.set_layout(1, 2).unwrap().len(), 2);
    let stage = engine.current_stage().unwrap();
    assert_eq!(stage.viewports, vec![tagged("A"), tagged("B")]);

    assert_eq!(engine.set_layout(2, 2).unwrap().len(), 4);
    let stage = engine.current_stage().unwrap();
    assert_eq!(stage.viewports[..2], [tagged("A"), tagged("B")]);
    assert!(stage.viewports[2].has_no_rules());
    assert!(stage.viewports[3].has_no_rules());
}

#[test]
fn authoring_edits_rerun_assignment() {
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.set_hanging_protocol(comparison_protocol()).unwrap();
    let bindings = engine
        .modify_protocol(Some("radiologist"), |protocol| {
            protocol.stages[0].viewports[0].add_rule(
                RuleLevel::Image,
                Rule::new("InstanceNumber", Constraint::equals(2)).required(),
            );
        })
        .unwrap();
    assert_eq!(bindings[0].instance_id.as_deref(), Some("1.2.3.1.2"));
    let details = &engine.match_details()[0];
    assert_eq!(details.image.as_ref().unwrap().score, 1);
}

#[test]
fn publish_sends_layout_and_every_binding() {
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.set_hanging_protocol(comparison_protocol()).unwrap();

    let mut surface = RecordingSurface::default();
    engine.publish(&mut surface, None);
    assert_eq!(surface.layouts, vec![2]);
    assert_eq!(surface.updates.len(), 2);

    let mut focused = RecordingSurface::default();
    engine.publish(&mut focused, Some(1));
    assert!(focused.layouts.is_empty());
    assert_eq!(focused.updates.len(), 1);
    assert_eq!(focused.updates[0].viewport_index, 1);
}

#[test]
fn published_bindings_carry_display_settings_and_skip_reports() {
    let mut current = ct_study("1.2.3", date(2024, 3, 1));
    current.series[0].instances.insert(
        0,
        Instance::new("1.2.3.1.0").with_attribute("SOPClassUID", "1.2.840.10008.5.1.4.1.1.88.11"),
    );
    let mut engine = ProtocolEngine::new(StudySet::current_only(current), StudyMetadataProvider::new());

    let mut protocol = Protocol::with_id("lung", "Lung window");
    protocol.add_stage(
        Stage::new("single", ViewportStructure::grid(1, 1).unwrap()).with_viewports(vec![
            viewport_for_prior(0)
                .with_setting("wlPreset", "Lung")
                .with_setting("invert", "YES"),
        ]),
    );
    engine.set_hanging_protocol(protocol).unwrap();

    let mut surface = RecordingSurface::default();
    engine.publish(&mut surface, None);
    let published = &surface.updates[0];
    assert_eq!(published.instance_id.as_deref(), Some("1.2.3.1.1"));
    assert_eq!(published.settings["invert"], AttributeValue::Bool(true));
    assert_eq!(published.settings["wlPreset"], AttributeValue::from("Lung"));
}

#[test]
fn reset_from_store_uses_stored_protocols() {
    let store = MemoryProtocolStore::with_protocols(vec![comparison_protocol()]).unwrap();
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.reset_from_store(&store).unwrap();
    assert_eq!(engine.protocol().unwrap().id(), "ct-compare");
    assert_eq!(store.all().unwrap().len(), 1);
}

#[test]
fn focused_viewport_survives_only_while_it_exists() {
    let mut engine = ProtocolEngine::new(current_and_prior(), StudyMetadataProvider::new());
    engine.set_hanging_protocol(comparison_protocol()).unwrap();
    engine.set_active_viewport(Some(1));
    assert_eq!(engine.state().active_viewport_index, Some(1));

    let before = engine.bindings().to_vec();
    engine.update_viewports(None);
    assert_eq!(engine.bindings(), before.as_slice());
    assert_eq!(engine.state().active_viewport_index, Some(1));

    engine.set_layout(1, 1).unwrap();
    assert_eq!(engine.state().active_viewport_index, None);
}
