//! Viewport layout declarations.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Largest number of viewport slots a single stage may declare.
pub const MAX_VIEWPORTS: usize = 64;

/// Layout family of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    #[default]
    Grid,
    Custom,
}

/// A free-form viewport region of a custom layout, in fractions of the
/// display area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Properties of a layout. Grid layouts use `rows` x `columns`; custom
/// layouts declare `viewportCount` or a list of regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutProperties {
    #[serde(default = "one")]
    pub rows: u32,
    #[serde(default = "one")]
    pub columns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layout_options: Vec<LayoutRegion>,
}

fn one() -> u32 {
    1
}

impl Default for LayoutProperties {
    fn default() -> Self {
        Self {
            rows: 1,
            columns: 1,
            viewport_count: None,
            layout_options: Vec::new(),
        }
    }
}

/// The declared layout of a stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportStructure {
    #[serde(alias = "type")]
    pub layout_type: LayoutType,
    #[serde(default)]
    pub properties: LayoutProperties,
}

impl ViewportStructure {
    /// A `rows` x `columns` grid.
    pub fn grid(rows: u32, columns: u32) -> Result<Self> {
        if rows == 0 || columns == 0 {
            return Err(ModelError::InvalidLayout { rows, columns });
        }
        let structure = Self {
            layout_type: LayoutType::Grid,
            properties: LayoutProperties {
                rows,
                columns,
                ..LayoutProperties::default()
            },
        };
        structure.validate()?;
        Ok(structure)
    }

    /// A custom layout made of the given regions.
    pub fn custom(regions: Vec<LayoutRegion>) -> Self {
        Self {
            layout_type: LayoutType::Custom,
            properties: LayoutProperties {
                viewport_count: Some(regions.len() as u32),
                layout_options: regions,
                ..LayoutProperties::default()
            },
        }
    }

    /// Number of viewport slots this layout requires. Saturates instead of
    /// overflowing; [`Self::validate`] rejects anything above
    /// [`MAX_VIEWPORTS`].
    pub fn viewport_count(&self) -> usize {
        let props = &self.properties;
        let grid = (props.rows as usize).saturating_mul(props.columns as usize);
        match self.layout_type {
            LayoutType::Grid => grid,
            LayoutType::Custom => match props.viewport_count {
                Some(count) => count as usize,
                None if !props.layout_options.is_empty() => props.layout_options.len(),
                None => grid,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.layout_type == LayoutType::Grid
            && (self.properties.rows == 0 || self.properties.columns == 0)
        {
            return Err(ModelError::InvalidLayout {
                rows: self.properties.rows,
                columns: self.properties.columns,
            });
        }
        let count = self.viewport_count();
        if count > MAX_VIEWPORTS {
            return Err(ModelError::LayoutTooLarge {
                count,
                max: MAX_VIEWPORTS,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_count_is_rows_times_columns() {
        assert_eq!(ViewportStructure::grid(2, 3).unwrap().viewport_count(), 6);
    }

    #[test]
    fn grid_rejects_zero_dimension() {
        assert!(matches!(
            ViewportStructure::grid(0, 2),
            Err(ModelError::InvalidLayout { rows: 0, columns: 2 })
        ));
    }

    #[test]
    fn oversized_layouts_are_rejected() {
        assert_eq!(
            ViewportStructure::grid(65_536, 65_536),
            Err(ModelError::LayoutTooLarge {
                count: 65_536 * 65_536,
                max: MAX_VIEWPORTS,
            })
        );
        assert!(ViewportStructure::grid(8, 8).is_ok());
        assert!(ViewportStructure::grid(8, 9).is_err());

        let decoded: ViewportStructure = serde_json::from_str(
            r#"{ "layoutType": "grid", "properties": { "rows": 100000, "columns": 100000 } }"#,
        )
        .unwrap();
        assert_eq!(decoded.viewport_count(), 10_000_000_000);
        assert!(matches!(
            decoded.validate(),
            Err(ModelError::LayoutTooLarge { .. })
        ));

        let mut custom = ViewportStructure::custom(Vec::new());
        custom.properties.viewport_count = Some(u32::MAX);
        assert!(custom.validate().is_err());
    }

    #[test]
    fn custom_count_prefers_declared_count() {
        let region = LayoutRegion {
            x: 0.0,
            y: 0.0,
            width: 0.5,
            height: 1.0,
        };
        let mut structure = ViewportStructure::custom(vec![region, region]);
        assert_eq!(structure.viewport_count(), 2);
        structure.properties.viewport_count = Some(3);
        assert_eq!(structure.viewport_count(), 3);
        structure.properties.viewport_count = None;
        assert_eq!(structure.viewport_count(), 2);
    }

    #[test]
    fn accepts_legacy_type_key() {
        let structure: ViewportStructure =
            serde_json::from_str(r#"{ "type": "grid", "properties": { "rows": 1, "columns": 2 } }"#)
                .unwrap();
        assert_eq!(structure.viewport_count(), 2);
    }
}
