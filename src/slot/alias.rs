//! Plain 1:1 slot aliases and their resolution to trigger slots

use indexmap::{IndexMap, IndexSet};

use super::{InputSlot, SlotRegistry};
use crate::config::VirtualMapping;

/// Alias graph built from the configured virtual mappings
///
/// An alias `target` carries whatever value its `source` carries. A slot with
/// no sources is a trigger slot: only events on trigger slots enter the tool
/// system, aliases are updated alongside them.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    sources: IndexMap<InputSlot, IndexSet<InputSlot>>,
    targets: IndexMap<InputSlot, IndexSet<InputSlot>>,
}

impl AliasMap {
    /// Empty alias graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns the mapping names and builds the graph
    pub fn from_mappings(mappings: &[VirtualMapping], registry: &SlotRegistry) -> Self {
        let mut aliases = Self::new();
        for mapping in mappings {
            aliases.add(registry.slot(&mapping.source), registry.slot(&mapping.target));
        }
        aliases
    }

    /// Declares `target` as an alias of `source`
    pub fn add(&mut self, source: InputSlot, target: InputSlot) {
        self.sources.entry(target).or_default().insert(source);
        self.targets.entry(source).or_default().insert(target);
    }

    /// Trigger slots feeding `slot`; a slot without sources resolves to itself
    pub fn resolve(&self, slot: InputSlot) -> IndexSet<InputSlot> {
        let mut resolved = IndexSet::new();
        let mut visiting = IndexSet::new();
        self.collect_triggers(slot, &mut resolved, &mut visiting);
        resolved
    }

    /// Union of [`Self::resolve`] over `slots`, in first-seen order
    pub fn resolve_all(&self, slots: &[InputSlot]) -> IndexSet<InputSlot> {
        let mut resolved = IndexSet::new();
        for &slot in slots {
            let mut visiting = IndexSet::new();
            self.collect_triggers(slot, &mut resolved, &mut visiting);
        }
        resolved
    }

    fn collect_triggers(
        &self,
        slot: InputSlot,
        resolved: &mut IndexSet<InputSlot>,
        visiting: &mut IndexSet<InputSlot>,
    ) {
        // Cycles are rejected when the configuration is validated; the guard
        // keeps hand-built graphs from recursing forever.
        if !visiting.insert(slot) {
            return;
        }
        match self.sources.get(&slot) {
            Some(sources) if !sources.is_empty() => {
                for &source in sources {
                    self.collect_triggers(source, resolved, visiting);
                }
            }
            _ => {
                resolved.insert(slot);
            }
        }
        visiting.swap_remove(&slot);
    }

    /// Every alias reachable from `slot`, transitively
    pub fn aliases_of(&self, slot: InputSlot) -> IndexSet<InputSlot> {
        let mut found = IndexSet::new();
        let mut stack = vec![slot];
        while let Some(current) = stack.pop() {
            for &target in self.targets.get(&current).into_iter().flatten() {
                if target != slot && found.insert(target) {
                    stack.push(target);
                }
            }
        }
        found
    }

    /// Direct sources of `slot`
    pub fn sources_of(&self, slot: InputSlot) -> impl Iterator<Item = InputSlot> + '_ {
        self.sources.get(&slot).into_iter().flatten().copied()
    }

    /// Every slot that appears as an alias target
    pub fn alias_slots(&self) -> impl Iterator<Item = InputSlot> + '_ {
        self.sources.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(source: &str, target: &str) -> VirtualMapping {
        VirtualMapping {
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_trigger_slot_resolves_to_itself() {
        let registry = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(&[mapping("Raw", "Derived")], &registry);
        let raw = registry.slot("Raw");
        assert_eq!(aliases.resolve(raw).into_iter().collect::<Vec<_>>(), vec![raw]);
    }

    #[test]
    fn test_alias_chain_resolves_transitively() {
        let registry = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(
            &[
                mapping("LeftButton", "PrimaryAction"),
                mapping("PrimaryAction", "PrimarySelection"),
            ],
            &registry,
        );
        let resolved = aliases.resolve(registry.slot("PrimarySelection"));
        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec![registry.slot("LeftButton")]
        );
    }

    #[test]
    fn test_alias_with_two_sources() {
        let registry = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(
            &[mapping("Mouse", "Select"), mapping("Wand", "Select")],
            &registry,
        );
        let resolved = aliases.resolve(registry.slot("Select"));
        assert_eq!(resolved.len(), 2);
        assert!(resolved.contains(&registry.slot("Mouse")));
        assert!(resolved.contains(&registry.slot("Wand")));
    }

    #[test]
    fn test_aliases_of_is_transitive() {
        let registry = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(
            &[mapping("A", "B"), mapping("B", "C"), mapping("X", "Y")],
            &registry,
        );
        let found = aliases.aliases_of(registry.slot("A"));
        assert_eq!(found.len(), 2);
        assert!(found.contains(&registry.slot("C")));
        assert!(!found.contains(&registry.slot("Y")));
    }

    #[test]
    fn test_hand_built_cycle_terminates() {
        let registry = SlotRegistry::new();
        let mut aliases = AliasMap::new();
        let a = registry.slot("A");
        let b = registry.slot("B");
        aliases.add(a, b);
        aliases.add(b, a);
        assert!(aliases.resolve(a).is_empty());
        assert_eq!(aliases.aliases_of(a).len(), 1);
    }
}
