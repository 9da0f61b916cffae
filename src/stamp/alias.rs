//! Stamp alias map
//!
//! Each stamp has at most one forward alias. Adding an alias to a stamp that
//! already has one walks down the existing chain and extends it at its end,
//! so chains collapse transitively.
//!
//! File layout: `i32 size | size × (stamp i32, alias i32)`.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use parking_lot::RwLock;

use crate::observability::{log_event_with_fields, Event};
use crate::store::codec::{count_to_i32, read_count, read_i32, write_i32};
use crate::store::files::{open_if_exists, write_atomically};
use crate::store::{StoreError, StoreResult};

/// Longest alias chain a walk will follow.
pub const MAX_ALIAS_CHAIN: usize = 10_000;

/// Result of `StampAliasMap::add_alias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasWalk {
    /// A new edge `from → to` was recorded.
    Recorded { from: u32, to: u32 },
    /// The alias was already reachable from the stamp.
    AlreadyPresent,
    /// Recording the edge would close a loop, or the chain exceeded
    /// `MAX_ALIAS_CHAIN`. Nothing was recorded.
    CycleDetected,
}

#[derive(Debug, Default)]
struct AliasState {
    forward: HashMap<u32, u32>,
    reverse: HashMap<u32, Vec<u32>>,
}

impl AliasState {
    fn reverse_edge_count(&self) -> usize {
        self.reverse.values().map(Vec::len).sum()
    }

    fn check_cardinality(&self) {
        assert_eq!(
            self.forward.len(),
            self.reverse_edge_count(),
            "alias forward and reverse maps diverged"
        );
    }

    fn insert(&mut self, from: u32, to: u32) {
        self.forward.insert(from, to);
        self.reverse.entry(to).or_default().push(from);
        self.check_cardinality();
    }

    /// Follows forward edges from `start`. `None` means a loop or an
    /// overlong chain.
    fn forward_chain(&self, start: u32) -> Option<Vec<u32>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut current = start;
        while let Some(&next) = self.forward.get(&current) {
            if !visited.insert(next) || chain.len() >= MAX_ALIAS_CHAIN {
                return None;
            }
            chain.push(next);
            current = next;
        }
        Some(chain)
    }
}

#[derive(Debug, Default)]
pub struct StampAliasMap {
    state: RwLock<AliasState>,
}

impl StampAliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `alias` is equivalent to `stamp`.
    pub fn add_alias(&self, stamp: u32, alias: u32) -> AliasWalk {
        let mut state = self.state.write();

        let mut current = stamp;
        let mut steps = 0;
        loop {
            if current == alias {
                return self.cycle(stamp, alias);
            }
            match state.forward.get(&current) {
                Some(&existing) if existing == alias => return AliasWalk::AlreadyPresent,
                Some(&existing) => {
                    steps += 1;
                    if steps > MAX_ALIAS_CHAIN {
                        return self.cycle(stamp, alias);
                    }
                    current = existing;
                }
                None => break,
            }
        }

        match state.forward_chain(alias) {
            Some(chain) if !chain.contains(&current) => {
                state.insert(current, alias);
                AliasWalk::Recorded {
                    from: current,
                    to: alias,
                }
            }
            _ => self.cycle(stamp, alias),
        }
    }

    fn cycle(&self, stamp: u32, alias: u32) -> AliasWalk {
        log_event_with_fields(
            Event::AliasCycleDetected,
            &[("stamp", &stamp.to_string()), ("alias", &alias.to_string())],
        );
        AliasWalk::CycleDetected
    }

    /// Every stamp equivalent to `stamp` through its forward chain or its
    /// reverse closure, sorted, without `stamp` itself.
    pub fn get_aliases(&self, stamp: u32) -> Vec<u32> {
        let state = self.state.read();
        let mut aliases = BTreeSet::new();

        match state.forward_chain(stamp) {
            Some(chain) => aliases.extend(chain),
            None => {
                log_event_with_fields(
                    Event::AliasCycleDetected,
                    &[("stamp", &stamp.to_string())],
                );
            }
        }

        let mut visited = HashSet::from([stamp]);
        let mut queue = VecDeque::from([stamp]);
        while let Some(next) = queue.pop_front() {
            if let Some(sources) = state.reverse.get(&next) {
                for &source in sources {
                    if visited.insert(source) {
                        aliases.insert(source);
                        queue.push_back(source);
                    }
                }
            }
        }

        aliases.remove(&stamp);
        aliases.into_iter().collect()
    }

    /// Number of alias edges.
    pub fn len(&self) -> usize {
        self.state.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of edges in the forward and reverse maps.
    pub fn sizes(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.forward.len(), state.reverse_edge_count())
    }

    pub fn write(&self, path: &Path) -> StoreResult<usize> {
        let mut edges: Vec<(u32, u32)> = self
            .state
            .read()
            .forward
            .iter()
            .map(|(&from, &to)| (from, to))
            .collect();
        edges.sort_unstable();
        let size = count_to_i32(edges.len(), "stamp alias")?;

        write_atomically(path, |w| {
            write_i32(w, size)?;
            for (from, to) in &edges {
                write_i32(w, *from as i32)?;
                write_i32(w, *to as i32)?;
            }
            Ok(())
        })?;
        Ok(edges.len())
    }

    /// Loads the alias file at `path`; a missing file yields an empty map.
    pub fn read(path: &Path) -> StoreResult<Self> {
        let map = Self::new();
        let mut reader = match open_if_exists(path)? {
            Some(reader) => reader,
            None => return Ok(map),
        };

        let size = read_count(&mut reader, "stamp alias").map_err(|e| e.with_path(path))?;
        {
            let mut state = map.state.write();
            for _ in 0..size {
                let from = read_i32(&mut reader);
                let to = read_i32(&mut reader);
                let (from, to) = match (from, to) {
                    (Ok(from), Ok(to)) if from >= 0 && to >= 0 => (from as u32, to as u32),
                    (Ok(from), Ok(to)) => {
                        return Err(StoreError::corruption_in_file(
                            path,
                            format!("negative alias edge {} -> {}", from, to),
                        ))
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        return Err(StoreError::corruption_in_file(
                            path,
                            format!("truncated alias entry: {}", e),
                        ))
                    }
                };
                if state.forward.contains_key(&from) {
                    return Err(StoreError::corruption_in_file(
                        path,
                        format!("stamp {} has two forward aliases", from),
                    ));
                }
                state.insert(from, to);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_alias_is_symmetric() {
        let map = StampAliasMap::new();
        assert_eq!(map.add_alias(1, 2), AliasWalk::Recorded { from: 1, to: 2 });
        assert_eq!(map.get_aliases(1), vec![2]);
        assert_eq!(map.get_aliases(2), vec![1]);
    }

    #[test]
    fn test_repeated_alias_is_noop() {
        let map = StampAliasMap::new();
        map.add_alias(1, 2);
        assert_eq!(map.add_alias(1, 2), AliasWalk::AlreadyPresent);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_second_alias_extends_chain() {
        let map = StampAliasMap::new();
        map.add_alias(1, 2);
        assert_eq!(map.add_alias(1, 3), AliasWalk::Recorded { from: 2, to: 3 });

        assert_eq!(map.get_aliases(1), vec![2, 3]);
        assert_eq!(map.get_aliases(2), vec![1, 3]);
        assert_eq!(map.get_aliases(3), vec![1, 2]);
    }

    #[test]
    fn test_alias_reachable_further_down_chain() {
        let map = StampAliasMap::new();
        map.add_alias(1, 2);
        map.add_alias(2, 3);
        assert_eq!(map.add_alias(1, 3), AliasWalk::AlreadyPresent);
    }

    #[test]
    fn test_loop_is_reported() {
        let map = StampAliasMap::new();
        map.add_alias(1, 2);
        assert_eq!(map.add_alias(2, 1), AliasWalk::CycleDetected);
        assert_eq!(map.add_alias(4, 4), AliasWalk::CycleDetected);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_maps_keep_equal_cardinality() {
        let map = StampAliasMap::new();
        map.add_alias(1, 9);
        map.add_alias(2, 9);
        map.add_alias(3, 1);
        let (forward, reverse) = map.sizes();
        assert_eq!(forward, 3);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let map = StampAliasMap::new();
        for stamp in 0..5_000u32 {
            map.add_alias(stamp, stamp + 1);
        }
        assert_eq!(map.get_aliases(0).len(), 5_000);
        assert_eq!(map.get_aliases(5_000).len(), 5_000);
    }

    #[test]
    fn test_write_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stamp-alias.map");
        let map = StampAliasMap::new();
        map.add_alias(1, 2);
        map.add_alias(3, 2);
        assert_eq!(map.write(&path).unwrap(), 2);

        let read = StampAliasMap::read(&path).unwrap();
        assert_eq!(read.get_aliases(2), vec![1, 3]);
        assert_eq!(read.sizes(), (2, 2));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let read = StampAliasMap::read(&temp_dir.path().join("stamp-alias.map")).unwrap();
        assert!(read.is_empty());
    }
}
