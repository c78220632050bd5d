//! Mapping between the tag tree and the logical scene.
//!
//! Decode walks `Item`/`Properties` tags, inferring value kinds from tag
//! names unless a schema declares the property's type. Reference-valued
//! properties are deferred as `(instance, property, referent)` triples and
//! resolved once the whole tree is built; referents that resolve to nothing
//! drop the property silently. Encode runs the reference registry over the
//! forest so every emitted `Item` carries a unique referent label.

use std::collections::HashMap;
use std::rc::Rc;

use crate::document::{Document, Tag};
use crate::scene::referent::ReferentRegistry;
use crate::scene::{is_empty_reference, DecodeOutput, EncodeOptions, Instance, InstanceRef, Scene};
use crate::schema::{DeclaredType, Schema};
use crate::util::{Error, Result, Warning};
use crate::value::{text, Value, ValueType};

/// Decode a tag tree into a scene.
pub fn decode(document: &Document, schema: Option<&Schema>) -> Result<DecodeOutput> {
    let mut dec = TreeDecoder {
        schema,
        lookup: HashMap::new(),
        deferred: Vec::new(),
        warnings: Vec::new(),
    };

    let mut scene = Scene::new();
    scene.instances = dec.items(None, &document.root.tags);

    // Resolve deferred references now that every instance is known.
    for (inst, property, referent) in dec.deferred {
        if let Some(target) = dec.lookup.get(&referent) {
            inst.borrow_mut()
                .properties
                .insert(property, Value::Reference(Rc::downgrade(target)));
        }
    }

    Ok(DecodeOutput {
        scene,
        warnings: dec.warnings,
    })
}

struct TreeDecoder<'a> {
    schema: Option<&'a Schema>,
    lookup: HashMap<String, InstanceRef>,
    deferred: Vec<(InstanceRef, String, String)>,
    warnings: Vec<Warning>,
}

impl TreeDecoder<'_> {
    fn items(&mut self, parent: Option<&InstanceRef>, tags: &[Tag]) -> Vec<InstanceRef> {
        let mut instances = Vec::new();
        let mut has_properties = false;

        for tag in tags {
            match tag.start_name.as_str() {
                "Item" => {
                    let Some(class_name) = tag.attr_value("class") else {
                        self.warnings.push(Warning::MissingClass);
                        continue;
                    };
                    let inst = Instance::new(class_name);

                    if let Some(referent) = tag.attr_value("referent") {
                        if !referent.is_empty() {
                            inst.borrow_mut().reference = referent.as_bytes().to_vec();
                            if !is_empty_reference(referent.as_bytes()) {
                                self.lookup.insert(referent.to_string(), inst.clone());
                            }
                        }
                    }

                    let children = self.items(Some(&inst), &tag.tags);
                    for child in &children {
                        Instance::set_parent(child, Some(&inst));
                    }

                    instances.push(inst);
                }
                "Properties" => {
                    // Only the first Properties block of an Item counts, and
                    // a block outside any Item is ignored.
                    let Some(inst) = parent else { continue };
                    if has_properties {
                        continue;
                    }
                    has_properties = true;
                    for property_tag in &tag.tags {
                        self.property(property_tag, inst);
                    }
                }
                // External headers and anything else are ignored.
                _ => {}
            }
        }

        instances
    }

    fn property(&mut self, tag: &Tag, inst: &InstanceRef) {
        let Some(name) = tag.attr_value("name") else {
            return;
        };

        let class_name = inst.borrow().class_name.clone();
        let declared = self
            .schema
            .and_then(|s| s.property_type(&class_name, name));

        let (ty, declared_enum) = match declared {
            Some(DeclaredType::Value(ty)) => (ty, None),
            Some(DeclaredType::Enum(enum_name, items)) => {
                (ValueType::Token, Some((enum_name, items)))
            }
            None => match ValueType::from_tag_name(&tag.start_name) {
                Some(ty) => (ty, None),
                None => return,
            },
        };

        let Some(value) = text::decode_tag(tag, ty) else {
            return;
        };

        if ty == ValueType::Reference {
            let referent = tag.content().to_string();
            if is_empty_reference(referent.as_bytes()) {
                // An explicit null reference is a value in its own right.
                inst.borrow_mut().properties.insert(name.to_string(), value);
            } else {
                self.deferred
                    .push((inst.clone(), name.to_string(), referent));
            }
            return;
        }

        if let (Some((enum_name, items)), Value::Token(token)) = (&declared_enum, &value) {
            if !items.contains(*token) {
                // The value is kept; the warning records the range violation.
                self.warnings.push(Warning::TokenOutOfRange {
                    enum_name: enum_name.to_string(),
                    value: *token,
                });
            }
        }

        inst.borrow_mut().properties.insert(name.to_string(), value);
    }
}

/// Encode a scene as a tag tree document.
pub fn encode(
    scene: &Scene,
    schema: Option<&Schema>,
    opts: &EncodeOptions,
) -> Result<(Document, Vec<Warning>)> {
    let registry = match opts.seed {
        Some(seed) => ReferentRegistry::with_seed(seed),
        None => ReferentRegistry::new(),
    };
    let mut enc = TreeEncoder {
        schema,
        registry,
        warnings: Vec::new(),
        visited: std::collections::HashSet::new(),
    };

    let mut root_tags = vec![
        Tag::with_text("External", "null"),
        Tag::with_text("External", "nil"),
    ];
    for inst in &scene.instances {
        enc.instance(inst, &mut root_tags)?;
    }

    Ok((Document::new(root_tags), enc.warnings))
}

struct TreeEncoder<'a> {
    schema: Option<&'a Schema>,
    registry: ReferentRegistry,
    warnings: Vec<Warning>,
    visited: std::collections::HashSet<*const std::cell::RefCell<Instance>>,
}

impl TreeEncoder<'_> {
    fn instance(&mut self, inst: &InstanceRef, out: &mut Vec<Tag>) -> Result<()> {
        if !self.visited.insert(Rc::as_ptr(inst)) {
            return Err(Error::ParentCycle(inst.borrow().class_name.clone()));
        }

        let class_name = inst.borrow().class_name.clone();
        if let Some(schema) = self.schema {
            if !schema.has_class(&class_name) {
                self.warnings.push(Warning::UnknownClass(class_name));
                return Ok(());
            }
        }

        let referent = self.registry.resolve(inst);
        let mut item = Tag::new("Item")
            .with_attr("class", class_name.clone())
            .with_attr("referent", referent);

        let mut properties_tag = Tag::new("Properties");
        let properties: Vec<(String, Value)> = inst
            .borrow()
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        for (name, value) in properties {
            if !self.property_allowed(&class_name, &name, &value) {
                continue;
            }
            let tag = match &value {
                Value::Reference(handle) => {
                    let target_label = handle
                        .upgrade()
                        .map(|target| self.registry.resolve(&target));
                    text::reference_tag(&name, target_label.as_deref())
                }
                other => match text::encode_tag(&name, other) {
                    Some(tag) => tag,
                    None => continue,
                },
            };
            properties_tag.tags.push(tag);
        }
        item.tags.push(properties_tag);

        let children = inst.borrow().children().to_vec();
        for child in &children {
            self.instance(child, &mut item.tags)?;
        }

        out.push(item);
        Ok(())
    }

    /// Schema-consistency filter: a declared property must match its declared
    /// type, and a declared enum token must be one of the enum's items.
    fn property_allowed(&mut self, class_name: &str, name: &str, value: &Value) -> bool {
        let Some(declared) = self.schema.and_then(|s| s.property_type(class_name, name)) else {
            return true;
        };
        match declared {
            DeclaredType::Value(ty) => {
                if value.value_type() != ty {
                    self.warnings.push(Warning::TypeMismatch {
                        class: class_name.to_string(),
                        property: name.to_string(),
                    });
                    return false;
                }
            }
            DeclaredType::Enum(enum_name, items) => match value {
                Value::Token(token) => {
                    if !items.contains(*token) {
                        self.warnings.push(Warning::TokenOutOfRange {
                            enum_name: enum_name.to_string(),
                            value: *token,
                        });
                        return false;
                    }
                }
                _ => {
                    self.warnings.push(Warning::TypeMismatch {
                        class: class_name.to_string(),
                        property: name.to_string(),
                    });
                    return false;
                }
            },
        }
        true
    }
}
