//! The finished per-type value-building unit.
//!
//! A [`Handler`] combines the selected instantiation strategy with the bound
//! property set. Its finalization hook resolves handlers for referenced
//! types through the resolution cache; nested-handler slots are `OnceCell`s
//! so a structurally complete handler can be observed by cyclic lookups
//! before its slots are filled.

use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use once_cell::sync::{Lazy, OnceCell};
use serde_json::Value;
use smallvec::{smallvec, SmallVec};

use crate::binder::{BoundProperty, BoundPropertySet, ObjectIdReader};
use crate::cache::ResolutionCache;
use crate::creator::{Instantiation, ScalarCreators};
use crate::descriptor::{node_kind, OverrideFn, ScalarKind, TypeDescriptor};
use crate::error::{BindError, BindResult};
use crate::metadata::{AnySetterSpec, TypeMetadata};

static NO_INJECTABLES: Lazy<InjectableValues> = Lazy::new(InjectableValues::new);

/// Caller-supplied, id-keyed source for injected parameters and properties.
///
/// # Examples
///
/// ```rust
/// use bindery::InjectableValues;
/// use serde_json::json;
///
/// let injected = InjectableValues::new().with("request.locale", json!("en"));
/// assert!(injected.find("request.locale").is_ok());
/// assert!(injected.find("missing").is_err());
/// ```
#[derive(Default, Clone)]
pub struct InjectableValues {
    values: AHashMap<String, Value>,
}

impl InjectableValues {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value under `id` (builder style).
    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.values.insert(id.into(), value);
        self
    }

    /// Adds a value under `id`.
    pub fn insert(&mut self, id: impl Into<String>, value: Value) {
        self.values.insert(id.into(), value);
    }

    /// Serializes `value` and stores it under `id`.
    pub fn insert_serialize<T: serde::Serialize>(
        &mut self,
        id: impl Into<String>,
        value: &T,
    ) -> BindResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| BindError::input(format!("unserializable injectable value: {}", e)))?;
        self.values.insert(id.into(), value);
        Ok(())
    }

    /// Looks up the value for `id`; missing ids are a build error.
    pub fn find(&self, id: &str) -> BindResult<&Value> {
        self.values
            .get(id)
            .ok_or_else(|| BindError::input(format!("no injectable value bound for id `{}`", id)))
    }
}

/// Fill-once slot for the handler of a referenced type.
struct NestedSlot {
    ty: TypeDescriptor,
    cell: OnceCell<Arc<Handler>>,
}

impl NestedSlot {
    fn for_type(ty: &TypeDescriptor) -> Option<Self> {
        if ty.scalar_kind().is_some() || ty.is_any() {
            return None;
        }
        Some(Self {
            ty: ty.clone(),
            cell: OnceCell::new(),
        })
    }
}

/// The finished, reusable value-building unit for one type.
///
/// Carries the instantiation strategy, bound properties, capture-remaining
/// fallback, back-reference wiring, and the object-identity reader. Created
/// by the handler assembler; owned by the resolution cache once committed.
pub struct Handler {
    ty: TypeDescriptor,
    instantiation: Instantiation,
    setters: Vec<BoundProperty>,
    back_references: Vec<BoundProperty>,
    any_setter: Option<AnySetterSpec>,
    id_reader: Option<ObjectIdReader>,
    cacheable: bool,
    override_build: Option<OverrideFn>,
    // Slots resolved during finalization, aligned with params/setters.
    param_slots: Vec<Option<NestedSlot>>,
    setter_slots: Vec<Option<NestedSlot>>,
    delegate_slot: Option<NestedSlot>,
}

impl Handler {
    pub(crate) fn assemble(
        ty: TypeDescriptor,
        instantiation: Instantiation,
        bound: BoundPropertySet,
        meta: &TypeMetadata,
    ) -> Self {
        let param_slots = instantiation
            .params()
            .iter()
            .map(|p| {
                if p.inject_id.is_some() {
                    None
                } else {
                    NestedSlot::for_type(&p.ty)
                }
            })
            .collect();
        let setter_slots = bound
            .setters
            .iter()
            .map(|s| {
                if s.inject_id.is_some() {
                    None
                } else {
                    NestedSlot::for_type(&s.ty)
                }
            })
            .collect();
        let delegate_slot = match &instantiation {
            Instantiation::Delegating { delegate_ty, .. } => NestedSlot::for_type(delegate_ty),
            _ => None,
        };

        Self {
            ty,
            instantiation,
            setters: bound.setters,
            back_references: bound.back_references,
            any_setter: bound.any_setter,
            id_reader: bound.id_reader,
            cacheable: meta.shareable,
            override_build: None,
            param_slots,
            setter_slots,
            delegate_slot,
        }
    }

    /// A pass-through handler around a per-call custom override; never
    /// cached.
    pub(crate) fn from_override(ty: TypeDescriptor, build: OverrideFn) -> Self {
        Self {
            ty,
            instantiation: Instantiation::default_creator("<override>", |_| Ok(Value::Null)),
            setters: Vec::new(),
            back_references: Vec::new(),
            any_setter: None,
            id_reader: None,
            cacheable: false,
            override_build: Some(build),
            param_slots: Vec::new(),
            setter_slots: Vec::new(),
            delegate_slot: None,
        }
    }

    /// Finalization hook: resolves handlers for every referenced type.
    ///
    /// Runs while this handler is registered in the in-flight registry, so
    /// cyclic type graphs observe this (structurally complete but
    /// not-yet-finalized) handler instead of recursing.
    pub(crate) fn finalize(&self, cache: &ResolutionCache) -> BindResult<()> {
        for slot in self.param_slots.iter().flatten() {
            fill(slot, cache)?;
        }
        for slot in self.setter_slots.iter().flatten() {
            fill(slot, cache)?;
        }
        if let Some(slot) = &self.delegate_slot {
            fill(slot, cache)?;
        }
        Ok(())
    }

    /// The type this handler builds.
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    /// The selected instantiation strategy.
    pub fn instantiation(&self) -> &Instantiation {
        &self.instantiation
    }

    /// Whether the handler declared itself safely shareable across the
    /// permanent cache.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// The object-identity reader, if the type declares one.
    pub fn object_id_reader(&self) -> Option<&ObjectIdReader> {
        self.id_reader.as_ref()
    }

    /// Bound non-creator properties.
    pub fn setters(&self) -> &[BoundProperty] {
        &self.setters
    }

    /// Builds an instance from `node` with no injectable values.
    pub fn build(&self, node: &Value) -> BindResult<Value> {
        self.build_with(node, &NO_INJECTABLES)
    }

    /// Builds an instance from `node`, resolving injected parameters and
    /// properties against `injected`.
    pub fn build_with(&self, node: &Value, injected: &InjectableValues) -> BindResult<Value> {
        if let Some(build) = &self.override_build {
            return build(node);
        }
        let mut instance = self.instantiate(node, injected)?;
        if matches!(
            self.instantiation,
            Instantiation::Default { .. } | Instantiation::Properties { .. }
        ) {
            self.populate(&mut instance, node, injected)?;
        }
        self.wire_back_references(&mut instance)?;
        Ok(instance)
    }

    fn instantiate(&self, node: &Value, injected: &InjectableValues) -> BindResult<Value> {
        match &self.instantiation {
            Instantiation::Default { invoke, .. } => invoke(&[]),
            Instantiation::Scalar { creators } => self.scalar_build(creators, node),
            Instantiation::Delegating {
                invoke,
                arity,
                delegate_index,
                delegate_ty,
                injected: injected_params,
                ..
            } => {
                let delegate =
                    self.build_nested(self.delegate_slot.as_ref(), delegate_ty, node, injected)?;
                let mut args: SmallVec<[Value; 4]> = smallvec![Value::Null; *arity];
                args[*delegate_index] = delegate;
                for (index, id) in injected_params {
                    args[*index] = injected.find(id)?.clone();
                }
                invoke(&args)
            }
            Instantiation::Properties { invoke, params, .. } => {
                let map = node.as_object().ok_or_else(|| {
                    BindError::input(format!(
                        "expected object input for `{}`, got {}",
                        self.ty,
                        node_kind(node)
                    ))
                })?;
                let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(params.len());
                for (i, param) in params.iter().enumerate() {
                    let arg = if let Some(id) = &param.inject_id {
                        injected.find(id)?.clone()
                    } else if let Some(name) = &param.name {
                        match map.get(name) {
                            Some(child) => self.build_nested(
                                self.param_slots[i].as_ref(),
                                &param.ty,
                                child,
                                injected,
                            )?,
                            None => Value::Null,
                        }
                    } else {
                        Value::Null
                    };
                    args.push(arg);
                }
                invoke(&args)
            }
        }
    }

    /// Tries the creators the input shape can feed, widest match last.
    fn scalar_build(&self, creators: &ScalarCreators, node: &Value) -> BindResult<Value> {
        use ScalarKind::*;
        let order: &[ScalarKind] = match node {
            Value::String(_) => &[Text, BigInteger, BigDecimal],
            Value::Bool(_) => &[Boolean],
            Value::Number(n) if !n.is_f64() => &[Int, Long, BigInteger, Double, BigDecimal],
            Value::Number(_) => &[Double, BigDecimal],
            _ => &[],
        };
        for kind in order {
            if let Some(creator) = creators.get(*kind) {
                if let Ok(arg) = kind.coerce(node) {
                    return (creator.invoke)(&[arg]);
                }
            }
        }
        Err(BindError::input(format!(
            "no scalar creator of `{}` accepts {} input",
            self.ty,
            node_kind(node)
        )))
    }

    fn populate(
        &self,
        instance: &mut Value,
        node: &Value,
        injected: &InjectableValues,
    ) -> BindResult<()> {
        let map = match node.as_object() {
            Some(map) => map,
            None => {
                // Nothing to populate from; a bare default creator accepts
                // an empty object only.
                if self.setters.is_empty() && self.any_setter.is_none() {
                    return Ok(());
                }
                return Err(BindError::input(format!(
                    "expected object input for `{}`, got {}",
                    self.ty,
                    node_kind(node)
                )));
            }
        };

        for (i, setter) in self.setters.iter().enumerate() {
            if setter.merge_fallback {
                continue;
            }
            if let Some(id) = &setter.inject_id {
                let value = injected.find(id)?.clone();
                (setter.apply)(instance, value)?;
            } else if let Some(child) = map.get(&setter.name) {
                let value =
                    self.build_nested(self.setter_slots[i].as_ref(), &setter.ty, child, injected)?;
                (setter.apply)(instance, value)?;
            } else if setter.required {
                return Err(BindError::input(format!(
                    "missing required property `{}` for `{}`",
                    setter.name, self.ty
                )));
            }
        }

        if let Some(any) = &self.any_setter {
            let consumed: AHashSet<&str> = self
                .instantiation
                .params()
                .iter()
                .filter_map(|p| p.name.as_deref())
                .chain(self.setters.iter().map(|s| s.name.as_str()))
                .chain(self.back_references.iter().map(|b| b.name.as_str()))
                .collect();
            for (key, value) in map {
                if !consumed.contains(key.as_str()) {
                    (any.apply)(instance, key, value.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Populates back-reference properties of direct children with the
    /// enclosing instance, as the final construction step.
    fn wire_back_references(&self, instance: &mut Value) -> BindResult<()> {
        if !self
            .setters
            .iter()
            .any(|s| s.managed_reference.is_some())
        {
            return Ok(());
        }
        let parent = instance.clone();
        for (i, setter) in self.setters.iter().enumerate() {
            let Some(managed) = &setter.managed_reference else {
                continue;
            };
            let Some(slot) = &self.setter_slots[i] else {
                continue;
            };
            let Some(child_handler) = slot.cell.get() else {
                continue;
            };
            if let Value::Object(map) = instance {
                if let Some(child) = map.get_mut(&setter.name) {
                    for back_ref in &child_handler.back_references {
                        if back_ref.back_reference.as_deref() == Some(managed.as_str()) {
                            (back_ref.apply)(child, parent.clone())?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn build_nested(
        &self,
        slot: Option<&NestedSlot>,
        ty: &TypeDescriptor,
        node: &Value,
        injected: &InjectableValues,
    ) -> BindResult<Value> {
        if node.is_null() {
            return Ok(Value::Null);
        }
        if let Some(kind) = ty.scalar_kind() {
            return kind.coerce(node);
        }
        if ty.is_any() {
            return Ok(node.clone());
        }
        let slot = slot.ok_or_else(|| {
            BindError::input(format!("no handler slot for nested type `{}`", ty))
        })?;
        let handler = slot.cell.get().ok_or_else(|| {
            BindError::input(format!("handler for `{}` was never finalized", ty))
        })?;
        handler.build_with(node, injected)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("ty", &self.ty.to_string())
            .field("instantiation", &self.instantiation)
            .field("setters", &self.setters.len())
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

fn fill(slot: &NestedSlot, cache: &ResolutionCache) -> BindResult<()> {
    if slot.cell.get().is_some() {
        return Ok(());
    }
    let handler = cache.resolve(&slot.ty)?;
    // A reentrant finalize may have filled the slot meanwhile; either way
    // the same handler instance wins.
    let _ = slot.cell.set(handler);
    Ok(())
}
