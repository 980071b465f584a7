//! Role → part bindings and the resolved part list of a loaded model.

use std::fmt;

use serde::Serialize;

/// The four limb slots a part can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    LeftLeg,
    RightLeg,
    LeftArm,
    RightArm,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::LeftLeg, Role::RightLeg, Role::LeftArm, Role::RightArm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::LeftLeg => "left_leg",
            Role::RightLeg => "right_leg",
            Role::LeftArm => "left_arm",
            Role::RightArm => "right_arm",
        }
    }

    /// Accepts both `left_leg` and `leftLeg` spellings.
    pub fn parse(s: &str) -> Result<Self, BindingError> {
        match s {
            "left_leg" | "leftLeg" => Ok(Role::LeftLeg),
            "right_leg" | "rightLeg" => Ok(Role::RightLeg),
            "left_arm" | "leftArm" => Ok(Role::LeftArm),
            "right_arm" | "rightArm" => Ok(Role::RightArm),
            other => Err(BindingError::UnknownRole(other.to_string())),
        }
    }

    fn index(&self) -> usize {
        match self {
            Role::LeftLeg => 0,
            Role::RightLeg => 1,
            Role::LeftArm => 2,
            Role::RightArm => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    UnknownRole(String),
    PartOutOfRange { index: usize, len: usize },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::UnknownRole(role) => write!(f, "Unknown role '{}'", role),
            BindingError::PartOutOfRange { index, len } => {
                write!(f, "Part index {} out of range ({} parts)", index, len)
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// At most one part per role. Roles are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartBindings<P: Copy> {
    slots: [Option<P>; 4],
}

impl<P: Copy> Default for PartBindings<P> {
    fn default() -> Self {
        Self { slots: [None; 4] }
    }
}

impl<P: Copy + PartialEq> PartBindings<P> {
    /// Bind `part` to `role`, returning whatever was bound there before.
    pub fn assign(&mut self, role: Role, part: P) -> Option<P> {
        self.slots[role.index()].replace(part)
    }

    pub fn unassign(&mut self, role: Role) -> Option<P> {
        self.slots[role.index()].take()
    }

    /// Unbind every role. Returns true when anything was bound.
    pub fn clear_all(&mut self) -> bool {
        let had_any = self.slots.iter().any(Option::is_some);
        self.slots = [None; 4];
        had_any
    }

    pub fn get(&self, role: Role) -> Option<P> {
        self.slots[role.index()]
    }

    pub fn is_bound_to(&self, role: Role, part: P) -> bool {
        self.get(role) == Some(part)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, Option<P>)> + '_ {
        Role::ALL.iter().map(move |role| (*role, self.get(*role)))
    }

    /// Bound roles only.
    pub fn bound(&self) -> impl Iterator<Item = (Role, P)> + '_ {
        self.iter().filter_map(|(role, part)| part.map(|p| (role, p)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartEntry<N> {
    pub index: usize,
    pub name: String,
    #[serde(skip)]
    pub node: N,
}

/// Every node of a loaded model, in traversal order, with stable indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PartList<N> {
    entries: Vec<PartEntry<N>>,
}

impl<N> Default for PartList<N> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<N: Copy> PartList<N> {
    /// Build from nodes already in traversal order. Unnamed or empty-named
    /// nodes get a `Part_<index>` placeholder.
    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (Option<String>, N)>,
    {
        let entries = nodes
            .into_iter()
            .enumerate()
            .map(|(index, (name, node))| PartEntry {
                index,
                name: name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Part_{}", index)),
                node,
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, index: usize) -> Result<&PartEntry<N>, BindingError> {
        self.entries.get(index).ok_or(BindingError::PartOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartEntry<N>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_overwrites_only_that_role() {
        let mut bindings = PartBindings::<u32>::default();
        bindings.assign(Role::RightLeg, 7);
        assert_eq!(bindings.assign(Role::LeftLeg, 1), None);
        assert_eq!(bindings.assign(Role::LeftLeg, 2), Some(1));
        assert_eq!(bindings.get(Role::LeftLeg), Some(2));
        assert_eq!(bindings.get(Role::RightLeg), Some(7));
    }

    #[test]
    fn test_same_part_in_two_roles() {
        let mut bindings = PartBindings::<u32>::default();
        bindings.assign(Role::LeftArm, 3);
        bindings.assign(Role::RightArm, 3);
        assert_eq!(bindings.bound().count(), 2);
    }

    #[test]
    fn test_clear_all() {
        let mut bindings = PartBindings::<u32>::default();
        assert!(!bindings.clear_all());
        bindings.assign(Role::LeftArm, 3);
        assert!(bindings.clear_all());
        assert!(bindings.iter().all(|(_, p)| p.is_none()));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("leftLeg"), Ok(Role::LeftLeg));
        assert_eq!(Role::parse("right_arm"), Ok(Role::RightArm));
        assert!(matches!(Role::parse("tail"), Err(BindingError::UnknownRole(_))));
    }

    #[test]
    fn test_part_list_placeholder_names() {
        let list = PartList::from_nodes(vec![
            (Some("Scene".to_string()), 10u32),
            (None, 11),
            (Some(String::new()), 12),
            (Some("Leg_L".to_string()), 13),
        ]);
        let names: Vec<&str> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Scene", "Part_1", "Part_2", "Leg_L"]);
        assert_eq!(list.get(3).unwrap().node, 13);
        assert_eq!(
            list.get(4).unwrap_err(),
            BindingError::PartOutOfRange { index: 4, len: 4 }
        );
    }
}
