//! Mapping between the chunk-level [`FormatModel`] and the logical scene.
//!
//! Decode keeps a scratch map from scene-local instance IDs to instance
//! handles for the duration of the call; the integers never reach the
//! logical model. Encode assigns dense IDs from a depth-first pre-order
//! traversal, grouping instances by class in first-seen order, and runs the
//! reference registry over the forest so every instance ends up with a
//! canonical label, the same as the textual encoder.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::rc::Rc;

use crate::bform::model::{
    Chunk, ChunkEnd, ChunkInstance, ChunkParent, ChunkProperty, FormatModel, PropertyValues,
    END_CONTENT,
};
use crate::scene::referent::ReferentRegistry;
use crate::scene::{DecodeOutput, EncodeOptions, Instance, InstanceRef, Scene};
use crate::schema::{DeclaredType, Schema};
use crate::util::{Error, Result, Warning};
use crate::value::{Value, ValueType};

/// Decode a binary stream into a scene. Fatal errors abort with no scene;
/// non-fatal problems surface as warnings on the output.
pub fn decode(r: impl Read, schema: Option<&Schema>) -> Result<DecodeOutput> {
    let mut model = FormatModel::default();
    model.read_from(r)?;
    interpret(model, schema)
}

/// Decode a binary scene file.
pub fn decode_file(path: impl AsRef<Path>, schema: Option<&Schema>) -> Result<DecodeOutput> {
    decode(BufReader::new(File::open(path)?), schema)
}

/// Encode a scene as a binary stream, returning the warnings gathered along
/// the way.
pub fn encode(
    w: impl Write,
    scene: &Scene,
    schema: Option<&Schema>,
    opts: &EncodeOptions,
) -> Result<Vec<Warning>> {
    let (model, warnings) = build_model(scene, schema, opts)?;
    model.write_to(w)?;
    Ok(warnings)
}

/// Encode a scene to a binary file.
pub fn encode_file(
    path: impl AsRef<Path>,
    scene: &Scene,
    schema: Option<&Schema>,
    opts: &EncodeOptions,
) -> Result<Vec<Warning>> {
    let mut w = BufWriter::new(File::create(path)?);
    let warnings = encode(&mut w, scene, schema, opts)?;
    w.flush()?;
    Ok(warnings)
}

struct GroupState {
    class_name: String,
    instances: Vec<InstanceRef>,
}

fn interpret(model: FormatModel, schema: Option<&Schema>) -> Result<DecodeOutput> {
    let mut warnings = model.warnings;

    let mut groups: HashMap<u32, GroupState> = HashMap::new();
    let mut by_id: HashMap<i32, InstanceRef> = HashMap::new();
    let mut creation_order: Vec<InstanceRef> = Vec::new();
    let mut prnt_listed: Vec<InstanceRef> = Vec::new();
    let mut group_chunks = 0u32;

    for chunk in &model.chunks {
        match chunk {
            Chunk::Instance(c) => {
                group_chunks += 1;
                let mut instances = Vec::with_capacity(c.instance_ids.len());
                for (i, &id) in c.instance_ids.iter().enumerate() {
                    let inst = Instance::new(c.class_name.clone());
                    inst.borrow_mut().is_service =
                        c.is_service && c.get_service.get(i).copied().unwrap_or(0) != 0;
                    by_id.insert(id, inst.clone());
                    creation_order.push(inst.clone());
                    instances.push(inst);
                }
                groups.insert(
                    c.group_id,
                    GroupState {
                        class_name: c.class_name.clone(),
                        instances,
                    },
                );
            }
            Chunk::Property(c) => {
                apply_property(c, &groups, &by_id, schema, &mut warnings);
            }
            Chunk::Parent(c) => {
                apply_parents(c, &by_id, &mut prnt_listed, &mut warnings);
            }
            Chunk::End(_) => {}
        }
    }

    if model.group_count != group_chunks {
        warnings.push(Warning::GroupCountMismatch {
            header: model.group_count,
            actual: group_chunks,
        });
    }
    if model.instance_count as usize != creation_order.len() {
        warnings.push(Warning::InstanceCountMismatch {
            header: model.instance_count,
            actual: creation_order.len() as u32,
        });
    }

    // Roots come out in PRNT entry order (the encoder's traversal order);
    // instances the parent relation never mentioned stay roots too, appended
    // in declaration order.
    let mut roots = Vec::new();
    let mut seen: HashSet<InstanceKey> = HashSet::new();
    for inst in prnt_listed.iter().chain(creation_order.iter()) {
        if inst.borrow().parent().is_none() && seen.insert(Rc::as_ptr(inst)) {
            roots.push(inst.clone());
        }
    }
    let scene = Scene { instances: roots };

    Ok(DecodeOutput { scene, warnings })
}

fn apply_property(
    chunk: &ChunkProperty,
    groups: &HashMap<u32, GroupState>,
    by_id: &HashMap<i32, InstanceRef>,
    schema: Option<&Schema>,
    warnings: &mut Vec<Warning>,
) {
    let Some(group) = groups.get(&chunk.group_id) else {
        warnings.push(Warning::UnknownGroup {
            group_id: chunk.group_id,
            property: chunk.property_name.clone(),
        });
        return;
    };

    if chunk.values.len() != group.instances.len() {
        warnings.push(Warning::PropertyCountMismatch {
            property: chunk.property_name.clone(),
            values: chunk.values.len(),
            instances: group.instances.len(),
        });
    }

    match &chunk.values {
        PropertyValues::Typed(values) => {
            let declared = schema.and_then(|s| s.property_type(&group.class_name, &chunk.property_name));
            for (inst, value) in group.instances.iter().zip(values.iter()) {
                if let Some(declared) = &declared {
                    if declared.value_type() != value.value_type() {
                        warnings.push(Warning::TypeMismatch {
                            class: group.class_name.clone(),
                            property: chunk.property_name.clone(),
                        });
                        continue;
                    }
                    if let (DeclaredType::Enum(name, en), Value::Token(token)) = (declared, value) {
                        if !en.contains(*token) {
                            // Value is retained; the warning records it.
                            warnings.push(Warning::TokenOutOfRange {
                                enum_name: name.to_string(),
                                value: *token,
                            });
                        }
                    }
                }
                inst.borrow_mut()
                    .properties
                    .insert(chunk.property_name.clone(), value.clone());
            }
        }
        PropertyValues::Referents(ids) => {
            for (inst, &id) in group.instances.iter().zip(ids.iter()) {
                // -1 and unresolvable IDs both drop the property.
                let Some(target) = by_id.get(&id) else { continue };
                inst.borrow_mut().properties.insert(
                    chunk.property_name.clone(),
                    Value::Reference(Rc::downgrade(target)),
                );
            }
        }
    }
}

fn apply_parents(
    chunk: &ChunkParent,
    by_id: &HashMap<i32, InstanceRef>,
    listed: &mut Vec<InstanceRef>,
    warnings: &mut Vec<Warning>,
) {
    let mut seen: HashSet<i32> = HashSet::new();
    for (&child_id, &parent_id) in chunk.children.iter().zip(chunk.parents.iter()) {
        if !seen.insert(child_id) {
            warnings.push(Warning::DuplicateChild(child_id));
        }
        let Some(child) = by_id.get(&child_id) else {
            continue;
        };
        listed.push(child.clone());
        let parent = if parent_id == -1 {
            None
        } else {
            // An unknown parent ID defaults the child to a scene root.
            by_id.get(&parent_id)
        };
        Instance::set_parent(child, parent);
    }
}

type InstanceKey = *const RefCell<Instance>;

fn build_model(
    scene: &Scene,
    schema: Option<&Schema>,
    opts: &EncodeOptions,
) -> Result<(FormatModel, Vec<Warning>)> {
    let mut warnings = Vec::new();

    // Depth-first pre-order over the forest; revisiting a node means the
    // parent graph is not a forest.
    let order = traverse(scene)?;

    // Canonicalize reference labels: empty or colliding labels are replaced
    // with fresh ones, written back into the instances.
    let mut registry = match opts.seed {
        Some(seed) => ReferentRegistry::with_seed(seed),
        None => ReferentRegistry::new(),
    };
    for inst in &order {
        registry.resolve(inst);
    }

    // Group by class name, preserving first-seen order; within a group,
    // preserve traversal order.
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut group_list: Vec<GroupState> = Vec::new();
    for inst in &order {
        let class_name = inst.borrow().class_name.clone();
        let idx = *group_index.entry(class_name.clone()).or_insert_with(|| {
            group_list.push(GroupState {
                class_name,
                instances: Vec::new(),
            });
            group_list.len() - 1
        });
        group_list[idx].instances.push(inst.clone());
    }

    // Dense instance IDs, assigned in group-emit order.
    let mut ids: HashMap<InstanceKey, i32> = HashMap::new();
    let mut next_id = 0i32;
    for group in &group_list {
        for inst in &group.instances {
            ids.insert(Rc::as_ptr(inst), next_id);
            next_id += 1;
        }
    }

    let mut chunks = Vec::new();

    for (group_id, group) in group_list.iter().enumerate() {
        let is_service = group.instances.iter().any(|i| i.borrow().is_service);
        chunks.push(Chunk::Instance(ChunkInstance {
            compressed: opts.compress,
            group_id: group_id as u32,
            class_name: group.class_name.clone(),
            instance_ids: group
                .instances
                .iter()
                .map(|i| ids[&Rc::as_ptr(i)])
                .collect(),
            is_service,
            get_service: if is_service {
                group
                    .instances
                    .iter()
                    .map(|i| i.borrow().is_service as u8)
                    .collect()
            } else {
                Vec::new()
            },
        }));
    }

    for (group_id, group) in group_list.iter().enumerate() {
        for chunk in
            build_property_chunks(group_id as u32, group, &ids, schema, opts, &mut warnings)
        {
            chunks.push(Chunk::Property(chunk));
        }
    }

    // Exactly one PRNT. Entries follow the traversal, which is what keeps
    // sibling and root order observable across a round-trip; the IDs alone
    // are group-major and would lose it.
    let mut children = Vec::with_capacity(order.len());
    let mut parents = Vec::with_capacity(order.len());
    for inst in &order {
        children.push(ids[&Rc::as_ptr(inst)]);
        parents.push(
            inst.borrow()
                .parent()
                .and_then(|p| ids.get(&Rc::as_ptr(&p)).copied())
                .unwrap_or(-1),
        );
    }
    chunks.push(Chunk::Parent(ChunkParent {
        compressed: opts.compress,
        version: 0,
        children,
        parents,
    }));

    chunks.push(Chunk::End(ChunkEnd {
        compressed: false,
        content: END_CONTENT.to_vec(),
    }));

    Ok((
        FormatModel {
            group_count: group_list.len() as u32,
            instance_count: order.len() as u32,
            chunks,
            warnings: Vec::new(),
        },
        warnings,
    ))
}

fn traverse(scene: &Scene) -> Result<Vec<InstanceRef>> {
    fn visit(
        inst: &InstanceRef,
        visited: &mut HashSet<InstanceKey>,
        order: &mut Vec<InstanceRef>,
    ) -> Result<()> {
        if !visited.insert(Rc::as_ptr(inst)) {
            return Err(Error::ParentCycle(inst.borrow().class_name.clone()));
        }
        order.push(inst.clone());
        let children = inst.borrow().children().to_vec();
        for child in &children {
            visit(child, visited, order)?;
        }
        Ok(())
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for root in &scene.instances {
        visit(root, &mut visited, &mut order)?;
    }
    Ok(order)
}

fn build_property_chunks(
    group_id: u32,
    group: &GroupState,
    ids: &HashMap<InstanceKey, i32>,
    schema: Option<&Schema>,
    opts: &EncodeOptions,
    warnings: &mut Vec<Warning>,
) -> Vec<ChunkProperty> {
    // Union of property names across the group; the column type comes from
    // the first instance carrying the property. BTreeMap iteration gives the
    // lexicographic chunk order.
    let mut prop_types: std::collections::BTreeMap<String, ValueType> =
        std::collections::BTreeMap::new();
    for inst in &group.instances {
        for (name, value) in &inst.borrow().properties {
            prop_types
                .entry(name.clone())
                .or_insert_with(|| value.value_type());
        }
    }

    let mut out = Vec::new();
    for (name, ty) in prop_types {
        let declared = schema.and_then(|s| s.property_type(&group.class_name, &name));
        if let Some(declared) = &declared {
            if declared.value_type() != ty {
                warnings.push(Warning::TypeMismatch {
                    class: group.class_name.clone(),
                    property: name.clone(),
                });
                continue;
            }
        }

        let values = if ty == ValueType::Reference {
            PropertyValues::Referents(
                group
                    .instances
                    .iter()
                    .map(|inst| {
                        inst.borrow()
                            .properties
                            .get(&name)
                            .and_then(Value::reference_target)
                            .and_then(|target| ids.get(&Rc::as_ptr(&target)).copied())
                            .unwrap_or(-1)
                    })
                    .collect(),
            )
        } else {
            let mut column = Vec::with_capacity(group.instances.len());
            let mut inconsistent = false;
            for inst in &group.instances {
                let value = match inst.borrow().properties.get(&name) {
                    Some(v) if v.value_type() == ty => v.clone(),
                    Some(_) | None => {
                        inconsistent = true;
                        Value::default_for(ty)
                    }
                };
                let value = match (&declared, &value) {
                    (Some(DeclaredType::Enum(en_name, en)), Value::Token(token))
                        if !en.contains(*token) =>
                    {
                        // Refused: the column slot falls back to zero.
                        warnings.push(Warning::TokenOutOfRange {
                            enum_name: en_name.to_string(),
                            value: *token,
                        });
                        Value::Token(0)
                    }
                    _ => value,
                };
                column.push(value);
            }
            if inconsistent {
                warnings.push(Warning::InconsistentProperty {
                    property: name.clone(),
                });
            }
            PropertyValues::Typed(column)
        };

        out.push(ChunkProperty {
            compressed: opts.compress,
            group_id,
            property_name: name,
            data_type: ty.id(),
            values,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Instance;
    use crate::value::Vector3;

    fn encode_bytes(scene: &Scene, opts: &EncodeOptions) -> Vec<u8> {
        let mut out = Vec::new();
        encode(&mut out, scene, None, opts).unwrap();
        out
    }

    #[test]
    fn test_group_assignment_is_first_seen_order() {
        let a = Instance::new("Part");
        let b = Instance::new("Model");
        let c = Instance::new("Part");
        let mut scene = Scene::new();
        scene.instances.extend([a, b, c]);

        let (model, _) = build_model(&scene, None, &EncodeOptions::default()).unwrap();
        assert_eq!(model.group_count, 2);
        assert_eq!(model.instance_count, 3);

        match (&model.chunks[0], &model.chunks[1]) {
            (Chunk::Instance(parts), Chunk::Instance(models)) => {
                assert_eq!(parts.class_name, "Part");
                assert_eq!(parts.instance_ids, vec![0, 1]);
                assert_eq!(models.class_name, "Model");
                assert_eq!(models.instance_ids, vec![2]);
            }
            other => panic!("unexpected chunk layout: {:?}", other),
        }
    }

    #[test]
    fn test_prnt_maps_roots_to_minus_one() {
        let root = Instance::new("Model");
        let child = Instance::new("Part");
        Instance::set_parent(&child, Some(&root));
        let mut scene = Scene::new();
        scene.instances.push(root);

        let (model, _) = build_model(&scene, None, &EncodeOptions::default()).unwrap();
        let parent_chunk = model
            .chunks
            .iter()
            .find_map(|c| match c {
                Chunk::Parent(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(parent_chunk.version, 0);
        assert_eq!(parent_chunk.children.len(), 2);
        assert!(parent_chunk.parents.contains(&-1));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let a = Instance::new("Model");
        let b = Instance::new("Model");
        Instance::set_parent(&b, Some(&a));
        // set_parent does not police cycles; the encoder must.
        Instance::set_parent(&a, Some(&b));

        let mut scene = Scene::new();
        scene.instances.push(a);
        let mut out = Vec::new();
        assert!(matches!(
            encode(&mut out, &scene, None, &EncodeOptions::default()),
            Err(Error::ParentCycle(_))
        ));
    }

    #[test]
    fn test_decode_restores_hierarchy_and_values() {
        let root = Instance::new("Model");
        let child = Instance::new("Part");
        child.borrow_mut().properties.insert(
            "Size".to_string(),
            Value::Vector3(Vector3::new(4.0, 1.0, 2.0)),
        );
        Instance::set_parent(&child, Some(&root));
        let mut scene = Scene::new();
        scene.instances.push(root);

        let bytes = encode_bytes(&scene, &EncodeOptions::default());
        let out = decode(bytes.as_slice(), None).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.scene.instances.len(), 1);

        let root = out.scene.instances[0].borrow();
        assert_eq!(root.class_name, "Model");
        assert_eq!(root.children().len(), 1);
        let part = root.children()[0].borrow();
        assert_eq!(part.class_name, "Part");
        assert_eq!(
            part.properties.get("Size"),
            Some(&Value::Vector3(Vector3::new(4.0, 1.0, 2.0)))
        );
    }
}
