//! Control panel model: collapse flags, per-role part checklists, speed
//! label and position readout. The shell renders this however it likes.

use glam::Vec3;
use serde::Serialize;

use crate::bindings::{PartBindings, PartList, Role};

/// Character position relative to the readout origin, two decimals per axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReadout {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl PositionReadout {
    pub fn new(position: Vec3, origin: Vec3) -> Self {
        let rel = position - origin;
        Self {
            x: format!("{:.2}", rel.x),
            y: format!("{:.2}", rel.y),
            z: format!("{:.2}", rel.z),
        }
    }
}

impl std::fmt::Display for PositionReadout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X: {}  Y: {}  Z: {}", self.x, self.y, self.z)
    }
}

pub fn speed_label(multiplier: f32) -> String {
    format!("{}x", multiplier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelState {
    pub expanded: bool,
    collapsed: [bool; 4],
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            expanded: true,
            collapsed: [false; 4],
        }
    }
}

impl PanelState {
    pub fn toggle_panel(&mut self) -> bool {
        self.expanded = !self.expanded;
        self.expanded
    }

    /// Returns the new collapsed flag.
    pub fn toggle_category(&mut self, role: Role) -> bool {
        let slot = &mut self.collapsed[Self::slot(role)];
        *slot = !*slot;
        *slot
    }

    pub fn is_collapsed(&self, role: Role) -> bool {
        self.collapsed[Self::slot(role)]
    }

    fn slot(role: Role) -> usize {
        Role::ALL.iter().position(|r| *r == role).unwrap_or(0)
    }

    /// Snapshot for display. A checkbox is checked only when its part is the
    /// one bound to that role, so clearing bindings unchecks everything.
    pub fn view<N: Copy + PartialEq>(
        &self,
        parts: &PartList<N>,
        bindings: &PartBindings<N>,
        speed_multiplier: f32,
        readout: Option<PositionReadout>,
    ) -> PanelView {
        let categories = Role::ALL
            .iter()
            .map(|role| CategoryView {
                role: *role,
                collapsed: self.is_collapsed(*role),
                items: parts
                    .iter()
                    .map(|entry| PanelItem {
                        index: entry.index,
                        name: entry.name.clone(),
                        checked: bindings.is_bound_to(*role, entry.node),
                    })
                    .collect(),
            })
            .collect();
        PanelView {
            expanded: self.expanded,
            speed_label: speed_label(speed_multiplier),
            readout,
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelItem {
    pub index: usize,
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub role: Role,
    pub collapsed: bool,
    pub items: Vec<PanelItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub expanded: bool,
    pub speed_label: String,
    pub readout: Option<PositionReadout>,
    pub categories: Vec<CategoryView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readout_relative_to_origin() {
        let origin = Vec3::new(681.30, -100.0, -50.0);
        let r = PositionReadout::new(Vec3::new(683.8, -100.0, -47.125), origin);
        assert_eq!(r.x, "2.50");
        assert_eq!(r.y, "0.00");
        assert_eq!(r.z, "2.88");
    }

    #[test]
    fn test_speed_label() {
        assert_eq!(speed_label(0.3), "0.3x");
        assert_eq!(speed_label(2.0), "2x");
    }

    #[test]
    fn test_toggles() {
        let mut panel = PanelState::default();
        assert!(!panel.toggle_panel());
        assert!(panel.toggle_panel());
        assert!(panel.toggle_category(Role::LeftArm));
        assert!(panel.is_collapsed(Role::LeftArm));
        assert!(!panel.is_collapsed(Role::LeftLeg));
    }

    #[test]
    fn test_view_checks_bound_parts_only() {
        let parts = PartList::from_nodes(vec![(None, 0u32), (None, 1), (None, 2)]);
        let mut bindings = PartBindings::default();
        bindings.assign(Role::LeftLeg, 1);
        let view = PanelState::default().view(&parts, &bindings, 0.3, None);

        assert_eq!(view.categories.len(), 4);
        let left_leg = &view.categories[0];
        let checked: Vec<usize> = left_leg.items.iter().filter(|i| i.checked).map(|i| i.index).collect();
        assert_eq!(checked, vec![1]);
        assert!(view.categories[1].items.iter().all(|i| !i.checked));

        bindings.clear_all();
        let view = PanelState::default().view(&parts, &bindings, 0.3, None);
        assert!(view.categories.iter().all(|c| c.items.iter().all(|i| !i.checked)));
    }
}
