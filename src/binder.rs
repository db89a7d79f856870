//! Property binding: reconciles creator parameters with setter/field
//! properties, the capture-remaining fallback, back references, injected
//! values, and the object-identity reader.

use std::fmt;

use ahash::AHashSet;

use crate::config::BindConfig;
use crate::creator::Instantiation;
use crate::descriptor::TypeDescriptor;
use crate::error::{BindError, BindResult};
use crate::metadata::{AnySetterSpec, ApplyFn, PropertySpec, TypeMetadata};

/// A non-creator property bound to the type.
#[derive(Clone)]
pub struct BoundProperty {
    pub(crate) name: String,
    pub(crate) ty: TypeDescriptor,
    pub(crate) inject_id: Option<String>,
    pub(crate) required: bool,
    pub(crate) back_reference: Option<String>,
    pub(crate) managed_reference: Option<String>,
    pub(crate) apply: ApplyFn,
    /// The property is also a creator parameter; its accessor is kept only
    /// as a merge fallback and is skipped during normal population.
    pub(crate) merge_fallback: bool,
}

impl BoundProperty {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the accessor is a merge-only fallback behind a creator
    /// parameter.
    pub fn is_merge_fallback(&self) -> bool {
        self.merge_fallback
    }
}

impl fmt::Debug for BoundProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundProperty")
            .field("name", &self.name)
            .field("ty", &self.ty.to_string())
            .field("inject_id", &self.inject_id)
            .field("required", &self.required)
            .field("back_reference", &self.back_reference)
            .field("managed_reference", &self.managed_reference)
            .field("merge_fallback", &self.merge_fallback)
            .finish()
    }
}

/// Resolves forward/duplicate references to the same logical entity.
#[derive(Debug, Clone)]
pub struct ObjectIdReader {
    /// Name of the property carrying the id.
    pub property: String,
    /// Declared type of the id property.
    pub ty: TypeDescriptor,
    /// Whether the id target is a creator parameter.
    pub from_creator: bool,
}

/// The complete bound-property set produced by the binder.
pub struct BoundPropertySet {
    pub(crate) setters: Vec<BoundProperty>,
    pub(crate) back_references: Vec<BoundProperty>,
    pub(crate) any_setter: Option<AnySetterSpec>,
    pub(crate) id_reader: Option<ObjectIdReader>,
}

impl BoundPropertySet {
    /// Bound non-creator properties (excluding back references).
    pub fn setters(&self) -> &[BoundProperty] {
        &self.setters
    }

    /// Back-reference properties, wired with the enclosing container.
    pub fn back_references(&self) -> &[BoundProperty] {
        &self.back_references
    }
}

impl fmt::Debug for BoundPropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundPropertySet")
            .field("setters", &self.setters)
            .field("back_references", &self.back_references)
            .field("any_setter", &self.any_setter)
            .field("id_reader", &self.id_reader)
            .finish()
    }
}

/// Reconciles creator-bound parameters with the discovered setter/field
/// properties of `ty`.
pub fn bind_properties(
    ty: &TypeDescriptor,
    strategy: &Instantiation,
    meta: &TypeMetadata,
    config: &BindConfig,
) -> BindResult<BoundPropertySet> {
    let creator_names: AHashSet<&str> = strategy
        .params()
        .iter()
        .filter_map(|p| p.name.as_deref())
        .collect();

    let mut setters = Vec::new();
    let mut back_references = Vec::new();
    for prop in &meta.properties {
        if meta.ignored.contains(&prop.name) {
            continue;
        }
        if let Some(included) = &meta.included {
            if !included.contains(&prop.name) {
                continue;
            }
        }
        if config.is_ignorable(prop.ty.name()) {
            continue;
        }

        let bound = to_bound(prop, creator_names.contains(prop.name.as_str()));
        if bound.back_reference.is_some() {
            back_references.push(bound);
        } else {
            setters.push(bound);
        }
    }

    // A back reference needs a real accessor on the child; a creator
    // parameter alone cannot receive the container after construction.
    for back_ref in &back_references {
        if back_ref.merge_fallback {
            return Err(BindError::definition(
                ty.clone(),
                format!(
                    "back reference `{}` cannot be bound through a creator parameter",
                    back_ref.name
                ),
            ));
        }
    }

    let any_setter = match meta.any_setters.len() {
        0 => None,
        1 => Some(meta.any_setters[0].clone()),
        _ => {
            return Err(BindError::definition(
                ty.clone(),
                format!(
                    "more than one capture-remaining fallback declared: {} and {}",
                    meta.any_setters[0].origin, meta.any_setters[1].origin
                ),
            ))
        }
    };

    let id_reader = match &meta.object_id {
        None => None,
        Some(spec) => Some(resolve_id_reader(ty, spec.property.as_str(), strategy, &setters)?),
    };

    Ok(BoundPropertySet {
        setters,
        back_references,
        any_setter,
        id_reader,
    })
}

fn to_bound(prop: &PropertySpec, creator_dup: bool) -> BoundProperty {
    BoundProperty {
        name: prop.name.clone(),
        ty: prop.ty.clone(),
        inject_id: prop.inject_id.clone(),
        // Injected properties resolve their source by id and are excluded
        // from required-input validation.
        required: prop.required && prop.inject_id.is_none(),
        back_reference: prop.back_reference.clone(),
        managed_reference: prop.managed_reference.clone(),
        apply: prop.apply.clone(),
        merge_fallback: creator_dup,
    }
}

/// The id target may be a creator parameter or a bound setter property.
fn resolve_id_reader(
    ty: &TypeDescriptor,
    target: &str,
    strategy: &Instantiation,
    setters: &[BoundProperty],
) -> BindResult<ObjectIdReader> {
    if let Some(param) = strategy
        .params()
        .iter()
        .find(|p| p.name.as_deref() == Some(target))
    {
        return Ok(ObjectIdReader {
            property: target.to_string(),
            ty: param.ty.clone(),
            from_creator: true,
        });
    }
    if let Some(prop) = setters.iter().find(|p| p.name == target) {
        return Ok(ObjectIdReader {
            property: target.to_string(),
            ty: prop.ty.clone(),
            from_creator: false,
        });
    }
    Err(BindError::definition(
        ty.clone(),
        format!(
            "invalid object-id definition: cannot find target property `{}`",
            target
        ),
    ))
}
