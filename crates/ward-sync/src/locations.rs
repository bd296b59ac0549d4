//! The location hierarchy: validation of fetched location sets and a
//! navigable tree over localized locations.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;
use ward_core::location::{LocalizedLocation, Location};

use crate::{Error, Result};

/// Reject a location set that would not form a forest: duplicate uuids,
/// parents outside the set, or parent chains that loop.
pub fn validate(locations: &[Location]) -> Result<()> {
  let mut parents: HashMap<Uuid, Option<Uuid>> = HashMap::with_capacity(locations.len());
  for loc in locations {
    if parents.insert(loc.uuid, loc.parent_uuid).is_some() {
      return Err(Error::DuplicateLocation(loc.uuid));
    }
  }
  for loc in locations {
    if let Some(parent) = loc.parent_uuid {
      if !parents.contains_key(&parent) {
        return Err(Error::UnknownParentLocation { location: loc.uuid, parent });
      }
    }
  }

  // Walk each parent chain once; nodes already proven to reach a root are
  // not walked again.
  let mut rooted: HashSet<Uuid> = HashSet::with_capacity(locations.len());
  for loc in locations {
    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    let mut cursor = Some(loc.uuid);
    while let Some(node) = cursor {
      if rooted.contains(&node) {
        break;
      }
      if !on_path.insert(node) {
        return Err(Error::LocationCycle(node));
      }
      path.push(node);
      cursor = parents.get(&node).copied().flatten();
    }
    rooted.extend(path);
  }
  Ok(())
}

/// A validated forest of localized locations.
#[derive(Debug, Clone)]
pub struct LocationTree {
  nodes:    BTreeMap<Uuid, LocalizedLocation>,
  children: BTreeMap<Uuid, Vec<Uuid>>,
  roots:    Vec<Uuid>,
}

impl LocationTree {
  pub fn build(locations: Vec<LocalizedLocation>) -> Result<Self> {
    let shape: Vec<Location> = locations
      .iter()
      .map(|l| Location { uuid: l.uuid, parent_uuid: l.parent_uuid })
      .collect();
    validate(&shape)?;

    let mut children: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
    let mut roots = Vec::new();
    for loc in &locations {
      match loc.parent_uuid {
        Some(parent) => children.entry(parent).or_default().push(loc.uuid),
        None => roots.push(loc.uuid),
      }
    }
    let nodes: BTreeMap<_, _> = locations.into_iter().map(|l| (l.uuid, l)).collect();

    // Siblings display alphabetically.
    let by_name = |a: &Uuid, b: &Uuid| nodes[a].name.cmp(&nodes[b].name);
    roots.sort_by(by_name);
    for siblings in children.values_mut() {
      siblings.sort_by(by_name);
    }

    Ok(Self { nodes, children, roots })
  }

  pub fn get(&self, uuid: Uuid) -> Option<&LocalizedLocation> { self.nodes.get(&uuid) }

  pub fn roots(&self) -> impl Iterator<Item = &LocalizedLocation> + '_ {
    self.roots.iter().filter_map(|id| self.nodes.get(id))
  }

  pub fn children(&self, uuid: Uuid) -> impl Iterator<Item = &LocalizedLocation> + '_ {
    self
      .children
      .get(&uuid)
      .into_iter()
      .flatten()
      .filter_map(|id| self.nodes.get(id))
  }

  /// Patients assigned to `uuid` or to any location beneath it.
  pub fn subtree_patient_count(&self, uuid: Uuid) -> u32 {
    self
      .subtree(uuid)
      .into_iter()
      .map(|(_, loc)| loc.patient_count)
      .sum()
  }

  /// Every location in depth-first pre-order, with its depth (roots are 0).
  pub fn depth_first(&self) -> Vec<(usize, &LocalizedLocation)> {
    let mut out = Vec::with_capacity(self.nodes.len());
    for root in &self.roots {
      self.walk(*root, 0, &mut out);
    }
    out
  }

  fn subtree(&self, uuid: Uuid) -> Vec<(usize, &LocalizedLocation)> {
    let mut out = Vec::new();
    self.walk(uuid, 0, &mut out);
    out
  }

  fn walk<'a>(&'a self, uuid: Uuid, depth: usize, out: &mut Vec<(usize, &'a LocalizedLocation)>) {
    let Some(node) = self.nodes.get(&uuid) else { return };
    out.push((depth, node));
    for child in self.children.get(&uuid).into_iter().flatten() {
      self.walk(*child, depth + 1, out);
    }
  }
}
