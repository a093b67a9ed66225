//! Attribute resolution against study, series and instance metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use hp_model::{ABSTRACT_PRIOR_VALUE, AttributeValue, Instance, Series, Study, StudySet};

/// The metadata an evaluation reads from.
///
/// Study rules see only `study`; series rules add `series`; image rules add
/// `instance`. `studies` gives access to the patient's ordered priors.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub study: &'a Study,
    pub series: Option<&'a Series>,
    pub instance: Option<&'a Instance>,
    pub studies: Option<&'a StudySet>,
    /// Abstract prior value of `study` when the caller already knows it.
    pub prior_index: Option<i64>,
}

impl<'a> MatchContext<'a> {
    pub fn for_study(study: &'a Study) -> Self {
        Self {
            study,
            series: None,
            instance: None,
            studies: None,
            prior_index: None,
        }
    }

    #[must_use]
    pub fn with_studies(mut self, studies: &'a StudySet) -> Self {
        self.studies = Some(studies);
        self
    }

    #[must_use]
    pub fn with_prior_index(mut self, index: i64) -> Self {
        self.prior_index = Some(index);
        self
    }

    #[must_use]
    pub fn with_series(mut self, series: &'a Series) -> Self {
        self.series = Some(series);
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: &'a Instance) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Abstract prior value of the study under evaluation.
    pub fn abstract_prior_value(&self) -> Option<i64> {
        self.prior_index.or_else(|| {
            self.studies
                .and_then(|set| set.prior_index_of(&self.study.study_instance_uid))
        })
    }
}

/// Supplies attribute values and prior studies to the engine.
pub trait MetadataProvider {
    /// The value of `attribute` in `context`, or `None` when absent.
    fn value(&self, attribute: &str, context: &MatchContext<'_>) -> Option<AttributeValue>;

    /// Prior studies of a patient, most recent first.
    fn prior_studies(&self, _patient_id: &str, _before: Option<NaiveDate>) -> Vec<Study> {
        Vec::new()
    }

    /// Default value for a synthetic attribute not backed by a DICOM tag.
    fn custom_attribute_default(&self, _name: &str) -> Option<AttributeValue> {
        None
    }
}

impl<T: MetadataProvider + ?Sized> MetadataProvider for &T {
    fn value(&self, attribute: &str, context: &MatchContext<'_>) -> Option<AttributeValue> {
        (**self).value(attribute, context)
    }

    fn prior_studies(&self, patient_id: &str, before: Option<NaiveDate>) -> Vec<Study> {
        (**self).prior_studies(patient_id, before)
    }

    fn custom_attribute_default(&self, name: &str) -> Option<AttributeValue> {
        (**self).custom_attribute_default(name)
    }
}

/// Provider reading the attribute maps carried by the records themselves.
///
/// Lookups go from the most specific record outwards (instance, series,
/// study). When a study rule asks for an attribute only its series carry
/// (e.g. `Modality`), the distinct series values are returned, as a list when
/// there is more than one. Series rules aggregate their instances likewise.
#[derive(Debug, Clone, Default)]
pub struct StudyMetadataProvider {
    archive: Vec<Study>,
    defaults: BTreeMap<String, AttributeValue>,
}

impl StudyMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Studies available as priors through [`MetadataProvider::prior_studies`].
    #[must_use]
    pub fn with_archive(mut self, studies: Vec<Study>) -> Self {
        self.archive = studies;
        self
    }

    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    fn identifier(attribute: &str, context: &MatchContext<'_>) -> Option<AttributeValue> {
        let text = |s: &str| Some(AttributeValue::from(s));
        match attribute {
            "StudyInstanceUID" => text(context.study.study_instance_uid.as_str()),
            "PatientID" => context.study.patient_id.as_deref().and_then(text),
            "StudyDate" => context
                .study
                .study_date
                .map(|date| AttributeValue::from(date.format("%Y%m%d").to_string())),
            "SeriesInstanceUID" => context.series.and_then(|s| text(s.series_instance_uid.as_str())),
            "SOPInstanceUID" => context.instance.and_then(|i| text(i.sop_instance_uid.as_str())),
            _ => None,
        }
    }
}

/// Distinct values in first-seen order; a single value is returned as is.
fn aggregate<'a>(values: impl Iterator<Item = &'a AttributeValue>) -> Option<AttributeValue> {
    let mut seen = BTreeSet::new();
    let mut distinct = Vec::new();
    for value in values {
        if seen.insert(value.to_text()) {
            distinct.push(value.clone());
        }
    }
    match distinct.len() {
        0 => None,
        1 => distinct.pop(),
        _ => Some(AttributeValue::List(distinct)),
    }
}

impl MetadataProvider for StudyMetadataProvider {
    fn value(&self, attribute: &str, context: &MatchContext<'_>) -> Option<AttributeValue> {
        if let Some(value) = Self::identifier(attribute, context) {
            return Some(value);
        }
        if let Some(value) = context.instance.and_then(|i| i.attributes.get(attribute)) {
            return Some(value.clone());
        }
        if let Some(series) = context.series {
            if let Some(value) = series.attributes.get(attribute) {
                return Some(value.clone());
            }
            if context.instance.is_none() {
                return aggregate(
                    series
                        .instances
                        .iter()
                        .filter_map(|i| i.attributes.get(attribute)),
                )
                .or_else(|| context.study.attributes.get(attribute).cloned());
            }
        }
        if let Some(value) = context.study.attributes.get(attribute) {
            return Some(value.clone());
        }
        if context.series.is_none() {
            return aggregate(
                context
                    .study
                    .series
                    .iter()
                    .filter_map(|s| s.attributes.get(attribute)),
            );
        }
        None
    }

    fn prior_studies(&self, patient_id: &str, before: Option<NaiveDate>) -> Vec<Study> {
        let mut priors: Vec<Study> = self
            .archive
            .iter()
            .filter(|study| study.patient_id.as_deref() == Some(patient_id))
            .filter(|study| match (before, study.study_date) {
                (Some(before), Some(date)) => date < before,
                _ => true,
            })
            .cloned()
            .collect();
        priors.sort_by(|a, b| b.study_date.cmp(&a.study_date));
        priors
    }

    fn custom_attribute_default(&self, name: &str) -> Option<AttributeValue> {
        self.defaults.get(name).cloned()
    }
}

/// Computes a synthetic attribute from the match context.
pub type AttributeCallback = Arc<dyn Fn(&MatchContext<'_>) -> Option<AttributeValue> + Send + Sync>;

/// A synthetic attribute: not a DICOM tag, computed or defaulted.
#[derive(Clone)]
pub struct CustomAttribute {
    pub name: String,
    pub display_name: String,
    callback: Option<AttributeCallback>,
    default: Option<AttributeValue>,
}

impl CustomAttribute {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            callback: None,
            default: None,
        }
    }

    #[must_use]
    pub fn with_callback(
        mut self,
        callback: impl Fn(&MatchContext<'_>) -> Option<AttributeValue> + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<AttributeValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn default_value(&self) -> Option<&AttributeValue> {
        self.default.as_ref()
    }

    fn compute(&self, context: &MatchContext<'_>) -> Option<AttributeValue> {
        self.callback.as_ref().and_then(|callback| callback(context))
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("has_callback", &self.callback.is_some())
            .field("default", &self.default)
            .finish()
    }
}

/// Resolves attribute names to values.
///
/// Order: `abstractPriorValue` from the context, custom attribute callback,
/// metadata provider, custom attribute default, provider default.
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
    custom: BTreeMap<String, CustomAttribute>,
}

impl AttributeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a custom attribute.
    pub fn register(&mut self, attribute: CustomAttribute) {
        self.custom.insert(attribute.name.clone(), attribute);
    }

    pub fn custom_attribute(&self, name: &str) -> Option<&CustomAttribute> {
        self.custom.get(name)
    }

    pub fn resolve(
        &self,
        attribute: &str,
        context: &MatchContext<'_>,
        provider: &dyn MetadataProvider,
    ) -> Option<AttributeValue> {
        if attribute == ABSTRACT_PRIOR_VALUE
            && let Some(index) = context.abstract_prior_value()
        {
            return Some(AttributeValue::from(index));
        }
        let custom = self.custom.get(attribute);
        custom
            .and_then(|c| c.compute(context))
            .or_else(|| provider.value(attribute, context))
            .or_else(|| custom.and_then(|c| c.default.clone()))
            .or_else(|| provider.custom_attribute_default(attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn study() -> Study {
        Study::new("1.2.3")
            .with_patient("PAT-1")
            .with_attribute("StudyDescription", "CT CHEST")
            .with_series(
                Series::new("1.2.3.1")
                    .with_attribute("Modality", "CT")
                    .with_instance(Instance::new("1.2.3.1.1").with_attribute("InstanceNumber", 1))
                    .with_instance(Instance::new("1.2.3.1.2").with_attribute("InstanceNumber", 2)),
            )
            .with_series(Series::new("1.2.3.2").with_attribute("Modality", "SR"))
    }

    #[test]
    fn study_level_aggregates_series_values() {
        let study = study();
        let provider = StudyMetadataProvider::new();
        let ctx = MatchContext::for_study(&study);
        assert_eq!(
            provider.value("Modality", &ctx),
            Some(AttributeValue::from(vec!["CT", "SR"]))
        );
        assert_eq!(
            provider.value("StudyDescription", &ctx),
            Some(AttributeValue::from("CT CHEST"))
        );
        assert_eq!(provider.value("PatientID", &ctx), Some(AttributeValue::from("PAT-1")));
        assert_eq!(provider.value("BodyPartExamined", &ctx), None);
    }

    #[test]
    fn instance_values_take_precedence() {
        let study = study();
        let series = &study.series[0];
        let provider = StudyMetadataProvider::new();
        let ctx = MatchContext::for_study(&study)
            .with_series(series)
            .with_instance(&series.instances[1]);
        assert_eq!(provider.value("InstanceNumber", &ctx), Some(AttributeValue::from(2)));
        assert_eq!(provider.value("Modality", &ctx), Some(AttributeValue::from("CT")));
        assert_eq!(
            provider.value("StudyDescription", &ctx),
            Some(AttributeValue::from("CT CHEST"))
        );
    }

    #[test]
    fn resolution_order() {
        let study = study();
        let provider = StudyMetadataProvider::new().with_default("viewerRole", "fallback");
        let mut resolver = AttributeResolver::new();
        resolver.register(
            CustomAttribute::new("seriesCount", "Number of series")
                .with_callback(|ctx| Some(AttributeValue::from(ctx.study.series.len() as i64))),
        );
        resolver.register(CustomAttribute::new("hangingGroup", "Group").with_default("A"));

        let ctx = MatchContext::for_study(&study).with_prior_index(2);
        let resolve = |name: &str| resolver.resolve(name, &ctx, &provider);
        assert_eq!(resolve(ABSTRACT_PRIOR_VALUE), Some(AttributeValue::from(2)));
        assert_eq!(resolve("seriesCount"), Some(AttributeValue::from(2)));
        assert_eq!(resolve("hangingGroup"), Some(AttributeValue::from("A")));
        assert_eq!(resolve("viewerRole"), Some(AttributeValue::from("fallback")));
        assert_eq!(resolve("Unknown"), None);
    }

    #[test]
    fn abstract_prior_value_from_study_set() {
        let current = study();
        let prior = Study::new("9.9").with_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let set = StudySet::new(current, vec![prior]);
        let resolver = AttributeResolver::new();
        let provider = StudyMetadataProvider::new();
        let ctx = MatchContext::for_study(&set.priors()[0]).with_studies(&set);
        assert_eq!(
            resolver.resolve(ABSTRACT_PRIOR_VALUE, &ctx, &provider),
            Some(AttributeValue::from(1))
        );
    }

    #[test]
    fn prior_studies_filtered_and_ordered() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let provider = StudyMetadataProvider::new().with_archive(vec![
            Study::new("a").with_patient("P").with_date(day(2019, 1, 1)),
            Study::new("b").with_patient("P").with_date(day(2021, 1, 1)),
            Study::new("c").with_patient("Q").with_date(day(2020, 1, 1)),
            Study::new("d").with_patient("P").with_date(day(2024, 1, 1)),
        ]);
        let priors = provider.prior_studies("P", Some(day(2023, 1, 1)));
        let uids: Vec<_> = priors.iter().map(|s| s.study_instance_uid.as_str()).collect();
        assert_eq!(uids, ["b", "a"]);
    }
}
