//! Context Slots
//!
//! A [`ContextSlot`] lets a nested reference say "my parent is whatever
//! model encloses me" without knowing where that model sits in the document.
//! An ancestor (or a preceding sibling) provides the slot with a concrete
//! path; descendants consume it.
//!
//! [`ScopeTable`] is an immutable, layered map. Providing a slot returns a new
//! table and leaves the old one untouched, so a scope can never leak bindings
//! into a scope it does not enclose.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entity_type::EntityType;
use crate::error::{RefError, Result};
use crate::path::ReferencePath;

static NEXT_SLOT_KEY: AtomicU64 = AtomicU64::new(1);

/// A typed, uniquely keyed alias for "the enclosing entity of type T"
#[derive(Debug, Clone)]
pub struct ContextSlot {
    key: u64,
    name: String,
    entity_type: EntityType,
}

impl ContextSlot {
    /// Every call creates a distinct slot, even with the same name
    pub fn new(name: impl Into<String>, entity_type: &EntityType) -> Self {
        Self {
            key: NEXT_SLOT_KEY.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entity_type: entity_type.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }
}

impl PartialEq for ContextSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ContextSlot {}

impl fmt::Display for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.name, self.entity_type)
    }
}

/// Concrete location a slot was provided with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBinding {
    pub path: ReferencePath,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, Default)]
struct ScopeFrame {
    parent: Option<ScopeTable>,
    declared: Vec<u64>,
    bindings: HashMap<u64, SlotBinding>,
}

/// Layered slot bindings
#[derive(Debug, Clone, Default)]
pub struct ScopeTable(Rc<ScopeFrame>);

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a nested layer; its bindings vanish when the caller drops it
    pub fn child(&self) -> Self {
        Self(Rc::new(ScopeFrame {
            parent: Some(self.clone()),
            ..ScopeFrame::default()
        }))
    }

    /// Open a nested layer that owns `slots`
    pub fn declare<'a>(&self, slots: impl IntoIterator<Item = &'a ContextSlot>) -> Self {
        Self(Rc::new(ScopeFrame {
            parent: Some(self.clone()),
            declared: slots.into_iter().map(|s| s.key).collect(),
            bindings: HashMap::new(),
        }))
    }

    fn frames(&self) -> impl Iterator<Item = &ScopeFrame> {
        std::iter::successors(Some(self.0.as_ref()), |frame| {
            frame.parent.as_ref().map(|p| p.0.as_ref())
        })
    }

    /// Bind `slot` to `path`, returning the extended table.
    ///
    /// The slot must be declared by an enclosing layer and not yet bound
    /// between here and that layer.
    pub fn provide(
        &self,
        slot: &ContextSlot,
        path: ReferencePath,
        entity_type: &EntityType,
        scope_path: &ReferencePath,
    ) -> Result<Self> {
        if &slot.entity_type != entity_type {
            return Err(RefError::ContextSlotTypeMismatch {
                slot: slot.name.clone(),
                expected: slot.entity_type.to_string(),
                actual: entity_type.to_string(),
                path: scope_path.to_string(),
            });
        }

        let mut declared = false;
        for frame in self.frames() {
            if frame.bindings.contains_key(&slot.key) {
                return Err(RefError::ContextSlotAlreadyProvided {
                    slot: slot.name.clone(),
                    path: scope_path.to_string(),
                });
            }
            if frame.declared.contains(&slot.key) {
                declared = true;
                break;
            }
        }
        if !declared {
            return Err(RefError::ContextSlotNotDeclared {
                slot: slot.name.clone(),
                path: scope_path.to_string(),
            });
        }

        let mut next = self.clone();
        Rc::make_mut(&mut next.0).bindings.insert(
            slot.key,
            SlotBinding {
                path,
                entity_type: entity_type.clone(),
            },
        );
        Ok(next)
    }

    /// Nearest binding of `slot`
    pub fn lookup(&self, slot: &ContextSlot) -> Option<&SlotBinding> {
        self.frames().find_map(|frame| frame.bindings.get(&slot.key))
    }

    /// Path bound to `slot`, failing if no enclosing scope provided it
    pub fn resolve(&self, slot: &ContextSlot, scope_path: &ReferencePath) -> Result<ReferencePath> {
        self.lookup(slot)
            .map(|binding| binding.path.clone())
            .ok_or_else(|| RefError::UnresolvedContextSlot {
                slot: slot.name.clone(),
                path: scope_path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> EntityType {
        EntityType::new("model")
    }

    #[test]
    fn test_provide_and_resolve() {
        let slot = ContextSlot::new("model", &model());
        let root = ScopeTable::new().declare([&slot]);
        let here = ReferencePath::parse("models.0");

        assert!(matches!(
            root.resolve(&slot, &here),
            Err(RefError::UnresolvedContextSlot { .. })
        ));

        let bound = root.provide(&slot, "models.0.id".into(), &model(), &here).unwrap();
        assert_eq!(bound.resolve(&slot, &here).unwrap(), ReferencePath::parse("models.0.id"));
        // `root` itself is untouched
        assert!(root.lookup(&slot).is_none());
    }

    #[test]
    fn test_provide_twice_in_same_scope_fails() {
        let slot = ContextSlot::new("model", &model());
        let root = ScopeTable::new().declare([&slot]);
        let here = ReferencePath::root();
        let bound = root.provide(&slot, "a".into(), &model(), &here).unwrap();
        let err = bound.provide(&slot, "b".into(), &model(), &here).unwrap_err();
        assert!(matches!(err, RefError::ContextSlotAlreadyProvided { .. }));

        // nested layers under the same declaration may not rebind either
        let err = bound.child().provide(&slot, "b".into(), &model(), &here).unwrap_err();
        assert!(matches!(err, RefError::ContextSlotAlreadyProvided { .. }));
    }

    #[test]
    fn test_sibling_layers_are_independent() {
        let slot = ContextSlot::new("model", &model());
        let root = ScopeTable::new().declare([&slot]);
        let here = ReferencePath::root();
        let first = root.child().provide(&slot, "models.0.id".into(), &model(), &here).unwrap();
        let second = root.child().provide(&slot, "models.1.id".into(), &model(), &here).unwrap();
        assert_eq!(first.resolve(&slot, &here).unwrap().to_string(), "models.0.id");
        assert_eq!(second.resolve(&slot, &here).unwrap().to_string(), "models.1.id");
    }

    #[test]
    fn test_undeclared_and_mistyped_slots() {
        let slot = ContextSlot::new("model", &model());
        let here = ReferencePath::root();
        let err = ScopeTable::new().provide(&slot, "a".into(), &model(), &here).unwrap_err();
        assert!(matches!(err, RefError::ContextSlotNotDeclared { .. }));

        let scoped = ScopeTable::new().declare([&slot]);
        let err = scoped
            .provide(&slot, "a".into(), &EntityType::new("enum"), &here)
            .unwrap_err();
        assert!(matches!(err, RefError::ContextSlotTypeMismatch { .. }));
    }

    #[test]
    fn test_slots_with_same_name_are_distinct() {
        let a = ContextSlot::new("model", &model());
        let b = ContextSlot::new("model", &model());
        assert_ne!(a, b);
        let scope = ScopeTable::new().declare([&a]);
        let err = scope.provide(&b, "x".into(), &model(), &ReferencePath::root()).unwrap_err();
        assert!(matches!(err, RefError::ContextSlotNotDeclared { .. }));
    }
}
