//! The logical scene model: a forest of polymorphic instances.
//!
//! Instances own their children; the scene owns its roots. The parent link is
//! a non-owning weak handle, so the ownership graph can never cycle even if a
//! misbehaving host wires the parent relation into one (the codecs detect
//! that case during encode and fail).

pub mod referent;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::util::Warning;
use crate::value::Value;

/// Shared handle to an instance. All mutation is single-threaded.
pub type InstanceRef = Rc<RefCell<Instance>>;

/// A node in the scene forest: a class name, an opaque reference label, a bag
/// of typed properties, and children.
#[derive(Debug, Default)]
pub struct Instance {
    pub class_name: String,

    /// Opaque reference identifier. `""`, `"null"` and `"nil"` are reserved
    /// empty markers; encoders regenerate the label when it is empty or
    /// collides.
    pub reference: Vec<u8>,

    /// Whether the instance is retrieved as a service rather than
    /// constructed.
    pub is_service: bool,

    /// Property map; iteration is lexicographic by name, which is the order
    /// encoders must emit.
    pub properties: BTreeMap<String, Value>,

    children: Vec<InstanceRef>,
    parent: Weak<RefCell<Instance>>,
}

impl Instance {
    /// Create a detached instance of the given class.
    pub fn new(class_name: impl Into<String>) -> InstanceRef {
        Rc::new(RefCell::new(Instance {
            class_name: class_name.into(),
            ..Instance::default()
        }))
    }

    /// Ordered child list.
    pub fn children(&self) -> &[InstanceRef] {
        &self.children
    }

    /// Current parent, if the instance is not a root.
    pub fn parent(&self) -> Option<InstanceRef> {
        self.parent.upgrade()
    }

    /// The reference label as text.
    pub fn reference_str(&self) -> String {
        String::from_utf8_lossy(&self.reference).into_owned()
    }

    /// Detach `child` from its current parent and append it to `parent`'s
    /// child list; `None` leaves it detached (a root, once the host adds it
    /// to the scene). Cycle prevention is the caller's responsibility.
    pub fn set_parent(child: &InstanceRef, parent: Option<&InstanceRef>) {
        let old = child.borrow().parent.upgrade();
        if let Some(old) = old {
            old.borrow_mut().children.retain(|c| !Rc::ptr_eq(c, child));
        }
        match parent {
            Some(parent) => {
                child.borrow_mut().parent = Rc::downgrade(parent);
                parent.borrow_mut().children.push(child.clone());
            }
            None => {
                child.borrow_mut().parent = Weak::new();
            }
        }
    }
}

/// Whether a reference label is one of the reserved empty markers.
pub fn is_empty_reference(reference: &[u8]) -> bool {
    matches!(reference, b"" | b"null" | b"nil")
}

/// A scene: an ordered sequence of root instances.
#[derive(Debug, Default)]
pub struct Scene {
    pub instances: Vec<InstanceRef>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth-first pre-order walk over the whole forest.
    pub fn walk(&self, f: &mut impl FnMut(&InstanceRef)) {
        fn visit(inst: &InstanceRef, f: &mut impl FnMut(&InstanceRef)) {
            f(inst);
            let children = inst.borrow().children.clone();
            for child in &children {
                visit(child, f);
            }
        }
        for root in &self.instances {
            visit(root, f);
        }
    }

    /// Total number of instances in the forest.
    pub fn len(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// A decoded scene together with the non-fatal diagnostics the decode
/// produced, in source order.
#[derive(Debug, Default)]
pub struct DecodeOutput {
    pub scene: Scene,
    pub warnings: Vec<Warning>,
}

/// Knobs for the encoders.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Compress chunk payloads (the END chunk always stays raw). Decoders
    /// accept either form.
    pub compress: bool,

    /// Deterministic seed for reference-identifier generation. `None` seeds
    /// from entropy, which is what production encodes should use.
    pub seed: Option<u64>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compress: true,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_parent_moves_child() {
        let a = Instance::new("Model");
        let b = Instance::new("Model");
        let child = Instance::new("Part");

        Instance::set_parent(&child, Some(&a));
        assert_eq!(a.borrow().children().len(), 1);
        assert!(Rc::ptr_eq(&child.borrow().parent().unwrap(), &a));

        Instance::set_parent(&child, Some(&b));
        assert!(a.borrow().children().is_empty());
        assert_eq!(b.borrow().children().len(), 1);
        assert!(Rc::ptr_eq(&child.borrow().parent().unwrap(), &b));

        Instance::set_parent(&child, None);
        assert!(b.borrow().children().is_empty());
        assert!(child.borrow().parent().is_none());
    }

    #[test]
    fn test_walk_order() {
        let root = Instance::new("Workspace");
        let a = Instance::new("A");
        let b = Instance::new("B");
        let a1 = Instance::new("A1");
        Instance::set_parent(&a, Some(&root));
        Instance::set_parent(&b, Some(&root));
        Instance::set_parent(&a1, Some(&a));

        let mut scene = Scene::new();
        scene.instances.push(root);

        let mut order = Vec::new();
        scene.walk(&mut |inst| order.push(inst.borrow().class_name.clone()));
        assert_eq!(order, ["Workspace", "A", "A1", "B"]);
        assert_eq!(scene.len(), 4);
    }

    #[test]
    fn test_empty_reference_markers() {
        assert!(is_empty_reference(b""));
        assert!(is_empty_reference(b"null"));
        assert!(is_empty_reference(b"nil"));
        assert!(!is_empty_reference(b"RBX00"));
    }
}
