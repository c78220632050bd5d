//! Reference-identifier interning and generation.
//!
//! On encode, every instance must end up with a unique non-empty reference
//! label. The registry interns labels as instances are visited; an empty or
//! colliding label is replaced with a freshly generated one, and the
//! replacement is written back into the instance so later scans agree.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::{is_empty_reference, InstanceRef};

pub struct ReferentRegistry {
    refs: HashMap<String, InstanceRef>,
    rng: StdRng,
}

impl ReferentRegistry {
    /// Registry with an entropy-seeded generator.
    pub fn new() -> Self {
        Self {
            refs: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Registry with a deterministic generator, for reproducible encodes.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            refs: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Return the instance's unique label, generating and writing back a
    /// fresh one if the current label is empty or already taken by a
    /// different instance.
    pub fn resolve(&mut self, instance: &InstanceRef) -> String {
        let mut label = instance.borrow().reference_str();

        let taken_by_other = self
            .refs
            .get(&label)
            .is_some_and(|holder| !Rc::ptr_eq(holder, instance));

        if is_empty_reference(label.as_bytes()) || taken_by_other {
            loop {
                label = self.generate();
                if !self.refs.contains_key(&label) {
                    instance.borrow_mut().reference = label.clone().into_bytes();
                    break;
                }
            }
        }

        self.refs.insert(label.clone(), instance.clone());
        label
    }

    /// `"RBX"` + 16 random bytes, hex-uppercased: 35 characters.
    fn generate(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        let mut label = String::with_capacity(35);
        label.push_str("RBX");
        for b in bytes {
            let _ = write!(label, "{:02X}", b);
        }
        label
    }
}

impl Default for ReferentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Instance;

    #[test]
    fn test_generated_label_shape() {
        let mut registry = ReferentRegistry::with_seed(1);
        let label = registry.generate();
        assert_eq!(label.len(), 35);
        assert!(label.starts_with("RBX"));
        assert!(label[3..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = ReferentRegistry::with_seed(7).generate();
        let b = ReferentRegistry::with_seed(7).generate();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_keeps_unique_labels() {
        let mut registry = ReferentRegistry::with_seed(0);
        let inst = Instance::new("Part");
        inst.borrow_mut().reference = b"RBXAA".to_vec();
        assert_eq!(registry.resolve(&inst), "RBXAA");
        // Resolving the same instance again is stable.
        assert_eq!(registry.resolve(&inst), "RBXAA");
    }

    #[test]
    fn test_resolve_regenerates_on_collision_and_empty() {
        let mut registry = ReferentRegistry::with_seed(0);

        let a = Instance::new("Part");
        a.borrow_mut().reference = b"RBXAA".to_vec();
        let b = Instance::new("Part");
        b.borrow_mut().reference = b"RBXAA".to_vec();

        assert_eq!(registry.resolve(&a), "RBXAA");
        let relabeled = registry.resolve(&b);
        assert_ne!(relabeled, "RBXAA");
        assert_eq!(b.borrow().reference_str(), relabeled);

        let empty = Instance::new("Part");
        let label = registry.resolve(&empty);
        assert_eq!(label.len(), 35);
        assert_eq!(empty.borrow().reference_str(), label);

        let nil = Instance::new("Part");
        nil.borrow_mut().reference = b"nil".to_vec();
        assert_ne!(registry.resolve(&nil), "nil");
    }
}
