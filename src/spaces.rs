//! Registry of vector spaces and their named subspaces.
//!
//! The anonymous space [SOME_SPACE] always exists; every named space gets a
//! full subspace registered automatically under the derived name
//! `"<space>.full"`. Registered names have exactly one owner across spaces
//! and subspaces, and ids are handed out monotonically and never reused.

use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};
use crate::utils::HashMapInsertNew;
use crate::types::{
    DimExtent, DimOffset, SpaceId, SubspaceId, FULL_SUBSPACE, MAX_SPACE_DIM, SOME_SPACE,
};

/// A registered vector space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSpace {
    id: SpaceId,
    dim: DimExtent,
    name: Option<String>,
}

impl VectorSpace {
    pub fn id(&self) -> SpaceId {
        self.id
    }

    pub fn dim(&self) -> DimExtent {
        self.dim
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The derived name under which the full subspace of this space is
    /// registered.
    pub fn full_subspace_name(&self) -> Option<String> {
        self.name.as_ref().map(|n| format!("{n}.full"))
    }
}

/// A registered subspace: a contiguous `[lower, upper]` range of basis
/// vectors of its parent space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    id: SubspaceId,
    space: SpaceId,
    lower: DimOffset,
    upper: DimOffset,
    name: Option<String>,
}

impl Subspace {
    pub fn id(&self) -> SubspaceId {
        self.id
    }

    pub fn space_id(&self) -> SpaceId {
        self.space
    }

    pub fn lower_bound(&self) -> DimOffset {
        self.lower
    }

    pub fn upper_bound(&self) -> DimOffset {
        self.upper
    }

    /// Number of basis vectors spanned by the subspace.
    pub fn dim(&self) -> DimExtent {
        self.upper - self.lower + 1
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Target of a registered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamedEntity {
    Space(SpaceId),
    Subspace(SpaceId, SubspaceId),
}

/// Owner of all [VectorSpace] and [Subspace] records for one server
/// session.
#[derive(Debug)]
pub struct SpaceRegistry {
    spaces: FxHashMap<SpaceId, VectorSpace>,
    subspaces: FxHashMap<SpaceId, FxHashMap<SubspaceId, Subspace>>,
    names: FxHashMap<String, NamedEntity>,
    next_space_id: SpaceId,
    next_subspace_id: FxHashMap<SpaceId, SubspaceId>,
}

impl Default for SpaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceRegistry {
    /// Creates a registry holding only the anonymous space.
    pub fn new() -> Self {
        let mut spaces = FxHashMap::default();
        spaces.insert(
            SOME_SPACE,
            VectorSpace {
                id: SOME_SPACE,
                dim: MAX_SPACE_DIM,
                name: None,
            },
        );
        Self {
            spaces,
            subspaces: FxHashMap::default(),
            names: FxHashMap::default(),
            next_space_id: SOME_SPACE + 1,
            next_subspace_id: FxHashMap::default(),
        }
    }

    /// Registers a named vector space of dimension `dim` and automatically
    /// registers its full subspace under `"<name>.full"`.
    ///
    /// # Examples
    /// ```
    /// use tensornet::spaces::SpaceRegistry;
    /// use tensornet::types::FULL_SUBSPACE;
    ///
    /// let mut reg = SpaceRegistry::new();
    /// let id = reg.create_space("orbitals", 16).unwrap();
    /// assert!(id > 0);
    /// let full = reg.subspace("orbitals.full").unwrap();
    /// assert_eq!(full.id(), FULL_SUBSPACE);
    /// assert_eq!((full.lower_bound(), full.upper_bound()), (0, 15));
    /// ```
    pub fn create_space(&mut self, name: &str, dim: DimExtent) -> Result<SpaceId> {
        if name.is_empty() || dim == 0 {
            return Err(Error::Validation(format!(
                "vector space '{name}' must have a name and a non-zero dimension"
            )));
        }
        let full_name = format!("{name}.full");
        if self.names.contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }
        if self.names.contains_key(&full_name) {
            return Err(Error::NameTaken(full_name));
        }

        let id = self.next_space_id;
        self.next_space_id += 1;
        self.spaces.insert_new(
            id,
            VectorSpace {
                id,
                dim,
                name: Some(name.to_string()),
            },
        );
        self.names
            .insert_new(name.to_string(), NamedEntity::Space(id));

        let full = Subspace {
            id: FULL_SUBSPACE,
            space: id,
            lower: 0,
            upper: dim - 1,
            name: Some(full_name.clone()),
        };
        self.subspaces
            .entry(id)
            .or_default()
            .insert(FULL_SUBSPACE, full);
        self.names
            .insert_new(full_name, NamedEntity::Subspace(id, FULL_SUBSPACE));
        self.next_subspace_id.insert(id, FULL_SUBSPACE + 1);

        Ok(id)
    }

    /// Registers a named subspace `[lower, upper]` of a named space.
    pub fn create_subspace(
        &mut self,
        name: &str,
        space_name: &str,
        bounds: (DimOffset, DimOffset),
    ) -> Result<SubspaceId> {
        let (lower, upper) = bounds;
        let space_id = self.space(space_name)?.id;
        let space_dim = self.spaces[&space_id].dim;
        if lower > upper || upper >= space_dim {
            return Err(Error::Validation(format!(
                "subspace '{name}' bounds [{lower}, {upper}] do not fit in '{space_name}' of dimension {space_dim}"
            )));
        }
        if self.names.contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }

        let next = self
            .next_subspace_id
            .get_mut(&space_id)
            .expect("named space always has a subspace id counter");
        let id = *next;
        *next += 1;

        self.subspaces.entry(space_id).or_default().insert(
            id,
            Subspace {
                id,
                space: space_id,
                lower,
                upper,
                name: Some(name.to_string()),
            },
        );
        self.names
            .insert(name.to_string(), NamedEntity::Subspace(space_id, id));
        Ok(id)
    }

    /// Destroys a named vector space. Fails if any non-trivial subspace of
    /// it is still registered; the anonymous space is never destructible.
    pub fn destroy_space(&mut self, name: &str) -> Result<()> {
        let id = self.space(name)?.id;
        self.destroy_space_by_id(id)
    }

    pub fn destroy_space_by_id(&mut self, id: SpaceId) -> Result<()> {
        if id == SOME_SPACE {
            return Err(Error::ReferentialIntegrity {
                name: "the anonymous space".to_string(),
                holder: "the registry itself".to_string(),
            });
        }
        let space = self.spaces.get(&id).ok_or(Error::UnknownSpace(id))?;
        let live = self
            .subspaces
            .get(&id)
            .map(|m| m.values().filter(|s| s.id != FULL_SUBSPACE).count())
            .unwrap_or(0);
        if live > 0 {
            return Err(Error::ReferentialIntegrity {
                name: space.name.clone().unwrap_or_default(),
                holder: format!("{live} live subspace(s)"),
            });
        }

        let space = self.spaces.remove(&id).expect("checked above");
        if let Some(name) = &space.name {
            self.names.remove(name);
        }
        if let Some(subs) = self.subspaces.remove(&id) {
            for sub in subs.values() {
                if let Some(name) = &sub.name {
                    self.names.remove(name);
                }
            }
        }
        Ok(())
    }

    /// Destroys a named subspace. The full subspace of a still-existing
    /// space is rejected.
    pub fn destroy_subspace(&mut self, name: &str) -> Result<()> {
        let (space_id, sub_id) = match self.names.get(name) {
            Some(NamedEntity::Subspace(space, sub)) => (*space, *sub),
            _ => return Err(Error::UnknownEntity(name.to_string())),
        };
        if sub_id == FULL_SUBSPACE && self.spaces.contains_key(&space_id) {
            return Err(Error::ReferentialIntegrity {
                name: name.to_string(),
                holder: "its parent vector space".to_string(),
            });
        }
        self.subspaces
            .get_mut(&space_id)
            .and_then(|m| m.remove(&sub_id));
        self.names.remove(name);
        Ok(())
    }

    /// Looks up a registered vector space by name.
    pub fn space(&self, name: &str) -> Result<&VectorSpace> {
        match self.names.get(name) {
            Some(NamedEntity::Space(id)) => Ok(&self.spaces[id]),
            _ => Err(Error::UnknownEntity(name.to_string())),
        }
    }

    /// Looks up a registered vector space by id.
    pub fn space_by_id(&self, id: SpaceId) -> Result<&VectorSpace> {
        self.spaces.get(&id).ok_or(Error::UnknownSpace(id))
    }

    /// Looks up a registered subspace by name.
    pub fn subspace(&self, name: &str) -> Result<&Subspace> {
        match self.names.get(name) {
            Some(NamedEntity::Subspace(space, sub)) => Ok(&self.subspaces[space][sub]),
            _ => Err(Error::UnknownEntity(name.to_string())),
        }
    }

    /// Looks up a registered subspace by parent space id and subspace id.
    pub fn subspace_by_id(&self, space: SpaceId, sub: SubspaceId) -> Option<&Subspace> {
        self.subspaces.get(&space).and_then(|m| m.get(&sub))
    }

    /// Whether a space id refers to a registered (or the anonymous) space.
    pub fn space_exists(&self, id: SpaceId) -> bool {
        self.spaces.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_subspace_autoregistration() {
        let mut reg = SpaceRegistry::new();
        let id = reg.create_space("orbitals", 8).unwrap();
        let full = reg.subspace("orbitals.full").unwrap();
        assert_eq!(full.id(), FULL_SUBSPACE);
        assert_eq!(full.space_id(), id);
        assert_eq!(full.lower_bound(), 0);
        assert_eq!(full.upper_bound(), 7);
        assert_eq!(full.dim(), 8);
    }

    #[test]
    fn test_monotonic_ids_not_reused() {
        let mut reg = SpaceRegistry::new();
        let a = reg.create_space("a", 2).unwrap();
        reg.destroy_space("a").unwrap();
        let b = reg.create_space("b", 2).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_name_uniqueness_across_kinds() {
        let mut reg = SpaceRegistry::new();
        reg.create_space("occ", 4).unwrap();
        assert!(matches!(
            reg.create_space("occ", 4),
            Err(Error::NameTaken(_))
        ));
        reg.create_subspace("core", "occ", (0, 1)).unwrap();
        assert!(matches!(
            reg.create_space("core", 4),
            Err(Error::NameTaken(_))
        ));
    }

    #[test]
    fn test_destroy_space_with_live_subspace_fails() {
        let mut reg = SpaceRegistry::new();
        reg.create_space("occ", 4).unwrap();
        reg.create_subspace("core", "occ", (0, 1)).unwrap();
        assert!(matches!(
            reg.destroy_space("occ"),
            Err(Error::ReferentialIntegrity { .. })
        ));
        reg.destroy_subspace("core").unwrap();
        reg.destroy_space("occ").unwrap();
    }

    #[test]
    fn test_destroy_full_subspace_rejected_while_space_lives() {
        let mut reg = SpaceRegistry::new();
        reg.create_space("occ", 4).unwrap();
        assert!(matches!(
            reg.destroy_subspace("occ.full"),
            Err(Error::ReferentialIntegrity { .. })
        ));
    }

    #[test]
    fn test_subspace_bounds_validated() {
        let mut reg = SpaceRegistry::new();
        reg.create_space("occ", 4).unwrap();
        assert!(reg.create_subspace("bad", "occ", (2, 6)).is_err());
        assert!(reg.create_subspace("bad", "occ", (3, 2)).is_err());
    }
}
