//! Study, series and instance metadata records.
//!
//! These are the values the metadata collaborator hands to the engine.
//! Attribute maps are keyed by DICOM keyword (`Modality`, `SeriesDescription`, ...).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::value::AttributeValue;

pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Storage SOP classes that carry pixel data.
const IMAGE_SOP_CLASSES: &[&str] = &[
    "1.2.840.10008.5.1.4.1.1.1",      // CR
    "1.2.840.10008.5.1.4.1.1.1.1",    // DX presentation
    "1.2.840.10008.5.1.4.1.1.1.1.1",  // DX processing
    "1.2.840.10008.5.1.4.1.1.1.2",    // MG presentation
    "1.2.840.10008.5.1.4.1.1.1.2.1",  // MG processing
    "1.2.840.10008.5.1.4.1.1.1.3",    // intra-oral
    "1.2.840.10008.5.1.4.1.1.2",      // CT
    "1.2.840.10008.5.1.4.1.1.2.1",    // enhanced CT
    "1.2.840.10008.5.1.4.1.1.3.1",    // US multi-frame
    "1.2.840.10008.5.1.4.1.1.4",      // MR
    "1.2.840.10008.5.1.4.1.1.4.1",    // enhanced MR
    "1.2.840.10008.5.1.4.1.1.6.1",    // US
    "1.2.840.10008.5.1.4.1.1.7",      // secondary capture
    "1.2.840.10008.5.1.4.1.1.7.1",
    "1.2.840.10008.5.1.4.1.1.7.2",
    "1.2.840.10008.5.1.4.1.1.7.3",
    "1.2.840.10008.5.1.4.1.1.7.4",
    "1.2.840.10008.5.1.4.1.1.12.1",   // XA
    "1.2.840.10008.5.1.4.1.1.12.2",   // XRF
    "1.2.840.10008.5.1.4.1.1.13.1.1", // breast tomosynthesis
    "1.2.840.10008.5.1.4.1.1.20",     // NM
    "1.2.840.10008.5.1.4.1.1.77.1.4", // VL photographic
    "1.2.840.10008.5.1.4.1.1.128",    // PET
    "1.2.840.10008.5.1.4.1.1.130",    // enhanced PET
    "1.2.840.10008.5.1.4.1.1.481.1",  // RT image
];

/// A single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub sop_instance_uid: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Instance {
    pub fn new(sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_instance_uid: sop_instance_uid.into(),
            attributes: AttributeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Whether the instance can be displayed in a viewport.
    ///
    /// An instance is skipped only when it declares a non-image SOP class and
    /// has no pixel rows; instances without a `SOPClassUID` are kept.
    pub fn is_image(&self) -> bool {
        let has_rows = self
            .attributes
            .get("Rows")
            .and_then(AttributeValue::as_number)
            .is_some_and(|rows| rows > 0.0);
        if has_rows {
            return true;
        }
        match self.attributes.get("SOPClassUID").map(AttributeValue::to_text) {
            Some(class) => IMAGE_SOP_CLASSES.contains(&class.trim()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub series_instance_uid: String,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Series {
    pub fn new(series_instance_uid: impl Into<String>) -> Self {
        Self {
            series_instance_uid: series_instance_uid.into(),
            attributes: AttributeMap::new(),
            instances: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub study_instance_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_date: Option<NaiveDate>,
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub series: Vec<Series>,
}

impl Study {
    pub fn new(study_instance_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            patient_id: None,
            study_date: None,
            attributes: AttributeMap::new(),
            series: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.study_date = Some(date);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }
}

/// The studies of one patient: the current study plus its priors.
///
/// Priors are kept most recent first; undated priors sort last and keep
/// their relative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StudySetRecord")]
pub struct StudySet {
    pub current: Study,
    priors: Vec<Study>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudySetRecord {
    current: Study,
    #[serde(default)]
    priors: Vec<Study>,
}

impl From<StudySetRecord> for StudySet {
    fn from(record: StudySetRecord) -> Self {
        Self::new(record.current, record.priors)
    }
}

impl StudySet {
    pub fn new(current: Study, priors: Vec<Study>) -> Self {
        let mut set = Self {
            current,
            priors,
        };
        set.sort_priors();
        set
    }

    pub fn current_only(current: Study) -> Self {
        Self::new(current, Vec::new())
    }

    fn sort_priors(&mut self) {
        // Descending by date, `None` last; sort_by is stable.
        self.priors
            .sort_by(|a, b| match (a.study_date, b.study_date) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
    }

    pub fn priors(&self) -> &[Study] {
        &self.priors
    }

    pub fn prior_count(&self) -> usize {
        self.priors.len()
    }

    /// The prior at the 1-based chronological index (1 = most recent).
    pub fn prior(&self, index: usize) -> Option<&Study> {
        index.checked_sub(1).and_then(|i| self.priors.get(i))
    }

    pub fn oldest_prior(&self) -> Option<&Study> {
        self.priors.last()
    }

    /// Resolve an abstract prior value: 0 is the current study, n > 0 the
    /// n-th most recent prior, -1 the oldest prior.
    pub fn by_abstract_prior(&self, value: i64) -> Option<&Study> {
        match value {
            0 => Some(&self.current),
            -1 => self.oldest_prior(),
            n if n > 0 => usize::try_from(n).ok().and_then(|n| self.prior(n)),
            _ => None,
        }
    }

    /// Add a prior that finished loading. Ignored when a study with the
    /// same uid is already present.
    pub fn push_prior(&mut self, study: Study) -> bool {
        let duplicate = self.current.study_instance_uid == study.study_instance_uid
            || self
                .priors
                .iter()
                .any(|p| p.study_instance_uid == study.study_instance_uid);
        if duplicate {
            return false;
        }
        self.priors.push(study);
        self.sort_priors();
        true
    }

    /// Every study with its abstract prior value, current study first.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &Study)> {
        std::iter::once((0, &self.current)).chain(
            self.priors
                .iter()
                .enumerate()
                .map(|(i, study)| (i as i64 + 1, study)),
        )
    }

    pub fn study_count(&self) -> usize {
        1 + self.priors.len()
    }

    /// The abstract prior value of a study in this set.
    pub fn prior_index_of(&self, study_instance_uid: &str) -> Option<i64> {
        self.iter()
            .find(|(_, study)| study.study_instance_uid == study_instance_uid)
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(uid: &str, y: i32, m: u32, d: u32) -> Study {
        Study::new(uid).with_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn image_detection_uses_sop_class_and_rows() {
        assert!(Instance::new("bare").is_image());
        let ct = Instance::new("ct").with_attribute("SOPClassUID", "1.2.840.10008.5.1.4.1.1.2");
        assert!(ct.is_image());
        let report =
            Instance::new("sr").with_attribute("SOPClassUID", "1.2.840.10008.5.1.4.1.1.88.22");
        assert!(!report.is_image());
        assert!(!report.clone().with_attribute("Rows", 0).is_image());
        assert!(report.with_attribute("Rows", 512).is_image());
    }

    #[test]
    fn priors_sorted_most_recent_first() {
        let set = StudySet::new(
            dated("current", 2024, 5, 1),
            vec![
                dated("old", 2019, 1, 1),
                Study::new("undated"),
                dated("recent", 2023, 6, 1),
            ],
        );
        let uids: Vec<_> = set
            .priors()
            .iter()
            .map(|s| s.study_instance_uid.as_str())
            .collect();
        assert_eq!(uids, ["recent", "old", "undated"]);
        assert_eq!(set.prior(1).unwrap().study_instance_uid, "recent");
        assert!(set.prior(0).is_none());
        assert_eq!(set.oldest_prior().unwrap().study_instance_uid, "undated");
    }

    #[test]
    fn abstract_prior_lookup() {
        let set = StudySet::new(
            dated("current", 2024, 5, 1),
            vec![dated("a", 2022, 1, 1), dated("b", 2023, 1, 1)],
        );
        assert_eq!(set.by_abstract_prior(0).unwrap().study_instance_uid, "current");
        assert_eq!(set.by_abstract_prior(1).unwrap().study_instance_uid, "b");
        assert_eq!(set.by_abstract_prior(-1).unwrap().study_instance_uid, "a");
        assert!(set.by_abstract_prior(3).is_none());
        assert!(set.by_abstract_prior(-2).is_none());
        assert_eq!(set.prior_index_of("a"), Some(2));
    }

    #[test]
    fn push_prior_keeps_order_and_rejects_duplicates() {
        let mut set = StudySet::current_only(dated("current", 2024, 5, 1));
        assert!(set.push_prior(dated("a", 2020, 1, 1)));
        assert!(set.push_prior(dated("b", 2022, 1, 1)));
        assert!(!set.push_prior(dated("a", 2020, 1, 1)));
        assert_eq!(set.prior(1).unwrap().study_instance_uid, "b");
        assert_eq!(set.study_count(), 3);
    }

    #[test]
    fn deserialization_sorts_priors() {
        let json = r#"{
            "current": { "studyInstanceUid": "c" },
            "priors": [
                { "studyInstanceUid": "p-old", "studyDate": "2018-02-03" },
                { "studyInstanceUid": "p-new", "studyDate": "2021-02-03" }
            ]
        }"#;
        let set: StudySet = serde_json::from_str(json).unwrap();
        assert_eq!(set.prior(1).unwrap().study_instance_uid, "p-new");
    }
}
