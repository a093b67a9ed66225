//! Layout reconciliation.

use hp_model::{Stage, Viewport, ViewportStructure};

/// Number of viewport slots a layout requires.
pub fn derive_viewport_count(structure: &ViewportStructure) -> usize {
    structure.viewport_count()
}

/// What [`reconcile`] did to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileChange {
    Unchanged,
    Grew { added: usize },
    Shrunk { removed: usize },
}

/// Resize `stage.viewports` to the count its layout requires.
///
/// Shrinking drops trailing viewports; growing appends viewports with no
/// rules. Removed viewports are never restored by a later growth.
pub fn reconcile(stage: &mut Stage) -> ReconcileChange {
    let required = derive_viewport_count(&stage.viewport_structure);
    let current = stage.viewports.len();
    if required < current {
        stage.viewports.truncate(required);
        ReconcileChange::Shrunk {
            removed: current - required,
        }
    } else if required > current {
        stage.viewports.resize_with(required, Viewport::default);
        ReconcileChange::Grew {
            added: required - current,
        }
    } else {
        ReconcileChange::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hp_model::{Constraint, Rule, RuleLevel};

    fn viewport(tag: &str) -> Viewport {
        let mut viewport = Viewport::new();
        viewport.add_rule(
            RuleLevel::Series,
            Rule::new("SeriesDescription", Constraint::equals(tag)),
        );
        viewport
    }

    #[test]
    fn shrink_truncates_then_growth_adds_empty_slots() {
        let mut stage = Stage::new("2x2", ViewportStructure::grid(2, 2).unwrap()).with_viewports(
            vec![viewport("A"), viewport("B"), viewport("C"), viewport("D")],
        );

        stage.viewport_structure = ViewportStructure::grid(1, 2).unwrap();
        assert_eq!(reconcile(&mut stage), ReconcileChange::Shrunk { removed: 2 });
        assert_eq!(stage.viewports, vec![viewport("A"), viewport("B")]);

        stage.viewport_structure = ViewportStructure::grid(2, 2).unwrap();
        assert_eq!(reconcile(&mut stage), ReconcileChange::Grew { added: 2 });
        assert_eq!(stage.viewports[..2], [viewport("A"), viewport("B")]);
        assert!(stage.viewports[2].has_no_rules());
        assert!(stage.viewports[3].has_no_rules());
    }

    #[test]
    fn consistent_stage_is_unchanged() {
        let mut stage = Stage::new("1x3", ViewportStructure::grid(1, 3).unwrap());
        assert_eq!(reconcile(&mut stage), ReconcileChange::Unchanged);
    }
}
