//! Which tools listen to which trigger slots
//!
//! Tools declare slots by the names they care about ("PrimaryAction"), but
//! only trigger slots ever carry events into the tool system. The slot
//! manager resolves every declared slot through the alias graph and keeps
//! three maps from trigger slot to tools:
//!
//! * *activation*: inactive pick tools that a press on the slot activates,
//! * *deactivation*: active pick tools that a release on the slot deactivates,
//! * *active*: tools whose current slots include the slot.
//!
//! A slot can be an activation slot for inactive tools and an active slot for
//! active ones at the same time.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::info;

use super::{ToolArena, ToolHandle};
use crate::slot::{AliasMap, InputSlot};

type ToolSets = IndexMap<InputSlot, IndexSet<ToolHandle>>;

fn insert(map: &mut ToolSets, slot: InputSlot, tool: ToolHandle) {
    map.entry(slot).or_default().insert(tool);
}

fn remove(map: &mut ToolSets, slot: InputSlot, tool: ToolHandle) {
    if let Some(tools) = map.get_mut(&slot) {
        tools.shift_remove(&tool);
    }
}

fn tools_for(map: &ToolSets, slot: InputSlot) -> IndexSet<ToolHandle> {
    map.get(&slot).cloned().unwrap_or_default()
}

/// Slot bookkeeping for all registered tools
#[derive(Debug, Default)]
pub struct SlotManager {
    aliases: AliasMap,
    activation: ToolSets,
    active: ToolSets,
    deactivation: ToolSets,
    /// Resolved trigger slots each active tool currently listens to
    used_slots: HashMap<ToolHandle, IndexSet<InputSlot>>,
    /// Declared slots each tool currently listens to
    declared_slots: HashMap<ToolHandle, IndexSet<InputSlot>>,
    /// Trigger slot to declared slot, per tool
    slot_names: HashMap<ToolHandle, HashMap<InputSlot, InputSlot>>,
}

impl SlotManager {
    pub fn new(aliases: AliasMap) -> Self {
        Self {
            aliases,
            ..Self::default()
        }
    }

    /// Trigger slots feeding `slot`
    pub fn resolve_slot(&self, slot: InputSlot) -> IndexSet<InputSlot> {
        self.aliases.resolve(slot)
    }

    fn name_slots(&mut self, tool: ToolHandle, declared: &[InputSlot]) {
        for &slot in declared {
            for trigger in self.aliases.resolve(slot) {
                self.slot_names.entry(tool).or_default().insert(trigger, slot);
            }
        }
    }

    /// Starts tracking a tool on its first attachment
    ///
    /// Always-active tools become active on their current slots; pick tools
    /// wait on their activation slots.
    pub fn register_tool(&mut self, tool: ToolHandle, tools: &ToolArena) {
        let activation = tools.activation_slots(tool);
        if activation.is_empty() {
            let current = tools.current_slots(tool);
            self.declared_slots
                .entry(tool)
                .or_default()
                .extend(current.iter().copied());
            let resolved = self.aliases.resolve_all(&current);
            for &slot in &resolved {
                insert(&mut self.active, slot, tool);
            }
            self.used_slots.entry(tool).or_default().extend(resolved);
            self.name_slots(tool, &current);
        } else {
            self.declared_slots
                .entry(tool)
                .or_default()
                .extend(activation.iter().copied());
            for slot in self.aliases.resolve_all(&activation) {
                insert(&mut self.activation, slot, tool);
            }
            self.name_slots(tool, &activation);
        }
        info!(%tool, description = tools.get(tool).map(|t| t.description()), "registered tool");
    }

    /// Stops tracking a tool after its last detachment
    pub fn unregister_tool(&mut self, tool: ToolHandle) {
        for map in [&mut self.activation, &mut self.active, &mut self.deactivation] {
            for tools in map.values_mut() {
                tools.shift_remove(&tool);
            }
        }
        self.used_slots.remove(&tool);
        self.declared_slots.remove(&tool);
        self.slot_names.remove(&tool);
        info!(%tool, "unregistered tool");
    }

    /// Applies the outcome of one trigger pass
    ///
    /// Activated tools move from their activation slots to the deactivation
    /// map and become active on their current slots; deactivated tools move
    /// back. Tools that stayed active get their listened slots refreshed,
    /// since a tool may change its current slots while active.
    pub fn update_maps(
        &mut self,
        still_active: &IndexSet<ToolHandle>,
        activated: &IndexSet<ToolHandle>,
        deactivated: &IndexSet<ToolHandle>,
        tools: &ToolArena,
    ) {
        for &tool in activated {
            let current = tools.current_slots(tool);
            for &slot in &current {
                for trigger in self.aliases.resolve(slot) {
                    insert(&mut self.active, trigger, tool);
                    self.slot_names.entry(tool).or_default().insert(trigger, slot);
                }
            }
            let resolved = self.aliases.resolve_all(&current);
            self.used_slots.entry(tool).or_default().extend(resolved);
            self.declared_slots
                .entry(tool)
                .or_default()
                .extend(current.iter().copied());

            for trigger in self.aliases.resolve_all(&tools.activation_slots(tool)) {
                remove(&mut self.activation, trigger, tool);
                insert(&mut self.deactivation, trigger, tool);
            }
        }

        for &tool in deactivated {
            for trigger in self.aliases.resolve_all(&tools.current_slots(tool)) {
                remove(&mut self.active, trigger, tool);
                if let Some(names) = self.slot_names.get_mut(&tool) {
                    names.remove(&trigger);
                }
            }
            // Slots a tool dropped from its current set while active
            if let Some(used) = self.used_slots.remove(&tool) {
                for trigger in used {
                    remove(&mut self.active, trigger, tool);
                }
            }
            let activation = tools.activation_slots(tool);
            for trigger in self.aliases.resolve_all(&activation) {
                insert(&mut self.activation, trigger, tool);
                remove(&mut self.deactivation, trigger, tool);
            }
            self.declared_slots
                .insert(tool, activation.iter().copied().collect());
            self.name_slots(tool, &activation);
        }

        for &tool in still_active {
            let current = tools.current_slots(tool);
            let new_used = self.aliases.resolve_all(&current);
            let old_used = self.used_slots.remove(&tool).unwrap_or_default();
            for &slot in new_used.difference(&old_used) {
                insert(&mut self.active, slot, tool);
            }
            for &slot in old_used.difference(&new_used) {
                remove(&mut self.active, slot, tool);
            }
            self.used_slots.insert(tool, new_used);

            let mut new_declared: IndexSet<InputSlot> =
                tools.activation_slots(tool).into_iter().collect();
            new_declared.extend(current.iter().copied());
            let old_declared = self.declared_slots.remove(&tool).unwrap_or_default();
            if let Some(names) = self.slot_names.get_mut(&tool) {
                names.retain(|_, declared| !old_declared.contains(declared) || new_declared.contains(declared));
            }
            let added: Vec<InputSlot> = new_declared.difference(&old_declared).copied().collect();
            self.name_slots(tool, &added);
            self.declared_slots.insert(tool, new_declared);
        }
    }

    /// Inactive tools a press on `slot` may activate
    pub fn tools_activated_by(&self, slot: InputSlot) -> IndexSet<ToolHandle> {
        tools_for(&self.activation, slot)
    }

    /// Active tools a release on `slot` deactivates
    pub fn tools_deactivated_by(&self, slot: InputSlot) -> IndexSet<ToolHandle> {
        tools_for(&self.deactivation, slot)
    }

    /// Active tools listening to `slot`
    pub fn active_tools_for(&self, slot: InputSlot) -> IndexSet<ToolHandle> {
        tools_for(&self.active, slot)
    }

    /// Whether events on `slot` can reach any tool
    pub fn is_trigger(&self, slot: InputSlot) -> bool {
        [&self.active, &self.activation, &self.deactivation]
            .into_iter()
            .any(|map| map.get(&slot).is_some_and(|tools| !tools.is_empty()))
    }

    /// Whether a press on `slot` activates `tool`
    pub fn is_activation_slot_of(&self, tool: ToolHandle, slot: InputSlot, tools: &ToolArena) -> bool {
        self.aliases
            .resolve_all(&tools.activation_slots(tool))
            .contains(&slot)
    }

    /// The name under which `tool` expects events from the trigger slot `slot`
    pub fn resolve_slot_for_tool(&self, tool: ToolHandle, slot: InputSlot) -> InputSlot {
        self.slot_names
            .get(&tool)
            .and_then(|names| names.get(&slot))
            .copied()
            .unwrap_or(slot)
    }

    /// Every tool in the active map, in first-seen order
    pub fn active_tools(&self) -> IndexSet<ToolHandle> {
        self.active.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VirtualMapping;
    use crate::slot::SlotRegistry;
    use crate::tool::Tool;

    struct Declared {
        activation: Vec<InputSlot>,
        current: Vec<InputSlot>,
    }

    impl Tool for Declared {
        fn activation_slots(&self) -> &[InputSlot] {
            &self.activation
        }

        fn current_slots(&self) -> &[InputSlot] {
            &self.current
        }
    }

    struct Fixture {
        registry: SlotRegistry,
        arena: ToolArena,
        manager: SlotManager,
    }

    fn fixture() -> Fixture {
        let registry = SlotRegistry::new();
        let aliases = AliasMap::from_mappings(
            &[
                VirtualMapping {
                    source: "LeftButton".into(),
                    target: "PrimaryAction".into(),
                },
                VirtualMapping {
                    source: "MouseMove".into(),
                    target: "Pointer".into(),
                },
            ],
            &registry,
        );
        Fixture {
            registry,
            arena: ToolArena::new(),
            manager: SlotManager::new(aliases),
        }
    }

    #[test]
    fn test_resolve_slot() {
        let f = fixture();
        let left = f.registry.slot("LeftButton");
        let primary = f.registry.slot("PrimaryAction");
        assert_eq!(f.manager.resolve_slot(primary).into_iter().collect::<Vec<_>>(), vec![left]);
        assert_eq!(f.manager.resolve_slot(left).into_iter().collect::<Vec<_>>(), vec![left]);
    }

    #[test]
    fn test_pick_tool_lifecycle() {
        let mut f = fixture();
        let left = f.registry.slot("LeftButton");
        let primary = f.registry.slot("PrimaryAction");
        let moved = f.registry.slot("MouseMove");
        let pointer = f.registry.slot("Pointer");
        let tool = f.arena.insert(Box::new(Declared {
            activation: vec![primary],
            current: vec![pointer],
        }));

        f.manager.register_tool(tool, &f.arena);
        assert!(f.manager.tools_activated_by(left).contains(&tool));
        assert!(f.manager.is_trigger(left));
        assert!(!f.manager.is_trigger(moved));
        assert_eq!(f.manager.resolve_slot_for_tool(tool, left), primary);

        let set: IndexSet<_> = [tool].into_iter().collect();
        f.manager
            .update_maps(&IndexSet::new(), &set, &IndexSet::new(), &f.arena);
        assert!(f.manager.tools_activated_by(left).is_empty());
        assert!(f.manager.tools_deactivated_by(left).contains(&tool));
        assert!(f.manager.active_tools_for(moved).contains(&tool));
        assert_eq!(f.manager.resolve_slot_for_tool(tool, moved), pointer);
        // Same trigger slot, activation for nobody, deactivation for the tool
        assert!(f.manager.is_trigger(left));

        f.manager
            .update_maps(&IndexSet::new(), &IndexSet::new(), &set, &f.arena);
        assert!(f.manager.tools_activated_by(left).contains(&tool));
        assert!(f.manager.tools_deactivated_by(left).is_empty());
        assert!(f.manager.active_tools_for(moved).is_empty());
        assert!(!f.manager.is_trigger(moved));
    }

    #[test]
    fn test_always_active_tool() {
        let mut f = fixture();
        let moved = f.registry.slot("MouseMove");
        let pointer = f.registry.slot("Pointer");
        let tool = f.arena.insert(Box::new(Declared {
            activation: vec![],
            current: vec![pointer],
        }));
        f.manager.register_tool(tool, &f.arena);
        assert!(f.manager.active_tools_for(moved).contains(&tool));
        assert_eq!(f.manager.active_tools().len(), 1);

        f.manager.unregister_tool(tool);
        assert!(f.manager.active_tools_for(moved).is_empty());
        assert!(f.manager.active_tools().is_empty());
    }

    #[test]
    fn test_still_active_tool_changes_current_slots() {
        let mut f = fixture();
        let moved = f.registry.slot("MouseMove");
        let wheel = f.registry.slot("Wheel");
        let tool = f.arena.insert(Box::new(Declared {
            activation: vec![],
            current: vec![moved],
        }));
        f.manager.register_tool(tool, &f.arena);

        // The tool swaps MouseMove for Wheel while active
        f.arena.downcast_mut::<Declared>(tool).unwrap().current = vec![wheel];
        let set: IndexSet<_> = [tool].into_iter().collect();
        f.manager
            .update_maps(&set, &IndexSet::new(), &IndexSet::new(), &f.arena);
        assert!(f.manager.active_tools_for(moved).is_empty());
        assert!(f.manager.active_tools_for(wheel).contains(&tool));
    }
}
