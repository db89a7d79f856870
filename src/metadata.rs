//! The metadata-provider boundary: declarative creator and property
//! descriptors consumed by the engine.
//!
//! The engine never performs introspection. Callers describe each type as
//! pure data: constructor/factory candidates with per-parameter markers,
//! setter/field properties, and class-level policy flags. The descriptors in
//! this module are produced fresh per resolution and discarded once the
//! handler is built.

use std::fmt;
use std::sync::Arc;

use ahash::AHashSet;
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::config::SingleArgPolicy;
use crate::descriptor::TypeDescriptor;
use crate::error::{BindError, BindResult};
use crate::extension::{InstantiatorProvider, StrategyModifier};

/// Type-erased creator invocation: ordered argument values in, instance out.
pub type InvokeFn = Arc<dyn Fn(&[Value]) -> BindResult<Value> + Send + Sync>;

/// Type-erased property accessor: writes a bound value into an instance.
pub type ApplyFn = Arc<dyn Fn(&mut Value, Value) -> BindResult<()> + Send + Sync>;

/// Type-erased capture-remaining fallback: receives the property name too.
pub type AnyApplyFn = Arc<dyn Fn(&mut Value, &str, Value) -> BindResult<()> + Send + Sync>;

/// Supplies declarative metadata for the types the engine resolves.
///
/// Implementations are consulted once per cache miss; the returned
/// [`TypeMetadata`] is consumed by creator selection and property binding and
/// then dropped.
pub trait MetadataProvider: Send + Sync {
    /// Describes `ty`, or fails with an unknown-type error when the provider
    /// has nothing for it.
    fn describe(&self, ty: &TypeDescriptor) -> BindResult<TypeMetadata>;
}

/// Declarative creator mode attached to a candidate by the caller's
/// annotation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorMode {
    /// Decorated, mode left for the engine to classify.
    Default,
    /// Single non-injected value passed through without property binding.
    Delegating,
    /// Every parameter bound to a named or injected logical property.
    Properties,
    /// Candidate is switched off and skipped entirely.
    Disabled,
}

/// Whether a candidate is a constructor or a factory function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorKind {
    /// Instance constructor.
    Constructor,
    /// Static factory function.
    Factory,
}

/// Per-parameter metadata of a creator candidate.
#[derive(Clone)]
pub struct ParamSpec {
    pub(crate) ty: TypeDescriptor,
    pub(crate) explicit_name: Option<String>,
    pub(crate) implicit_name: Option<String>,
    pub(crate) inject_id: Option<String>,
    pub(crate) unwrap: bool,
}

impl ParamSpec {
    /// A parameter of the given type with no markers.
    pub fn of(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            explicit_name: None,
            implicit_name: None,
            inject_id: None,
            unwrap: false,
        }
    }

    /// Attaches an explicitly declared name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.explicit_name = Some(name.into());
        self
    }

    /// Attaches an implicitly discovered name (for example from debug info).
    pub fn implicitly_named(mut self, name: impl Into<String>) -> Self {
        self.implicit_name = Some(name.into());
        self
    }

    /// Marks the parameter as populated from an id-keyed injectable source.
    pub fn injected(mut self, id: impl Into<String>) -> Self {
        self.inject_id = Some(id.into());
        self
    }

    /// Attaches the unwrap marker.
    pub fn unwrapped(mut self) -> Self {
        self.unwrap = true;
        self
    }

    /// Explicit name if declared, otherwise the implicit one.
    pub fn resolved_name(&self) -> Option<&str> {
        self.explicit_name
            .as_deref()
            .or(self.implicit_name.as_deref())
    }

    /// Whether the parameter is usable as a named or injected binding.
    pub(crate) fn is_named_or_injected(&self) -> bool {
        self.resolved_name().is_some() || self.inject_id.is_some()
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("ty", &self.ty.to_string())
            .field("explicit_name", &self.explicit_name)
            .field("implicit_name", &self.implicit_name)
            .field("inject_id", &self.inject_id)
            .field("unwrap", &self.unwrap)
            .finish()
    }
}

/// A constructor or factory candidate with its ordered parameter list.
///
/// The `invoke` closure is the only way the engine builds instances; the
/// default implementation assembles an object keyed by resolved parameter
/// names (or passes a sole unnamed argument through), which is convenient for
/// test doubles. Real providers supply their own.
///
/// # Examples
///
/// ```rust
/// use bindery::{CreatorCandidate, CreatorMode, ParamSpec, TypeDescriptor};
///
/// let ctor = CreatorCandidate::constructor("Point(int,int)")
///     .mode(CreatorMode::Properties)
///     .param(ParamSpec::of(TypeDescriptor::int()).named("x"))
///     .param(ParamSpec::of(TypeDescriptor::int()).named("y"));
/// assert_eq!(ctor.arity(), 2);
/// ```
#[derive(Clone)]
pub struct CreatorCandidate {
    pub(crate) kind: CreatorKind,
    pub(crate) mode: Option<CreatorMode>,
    pub(crate) visible: bool,
    pub(crate) params: SmallVec<[ParamSpec; 4]>,
    pub(crate) signature: String,
    pub(crate) invoke: InvokeFn,
    custom_invoke: bool,
}

impl CreatorCandidate {
    fn new(kind: CreatorKind, signature: impl Into<String>) -> Self {
        Self {
            kind,
            mode: None,
            visible: true,
            params: SmallVec::new(),
            signature: signature.into(),
            invoke: Arc::new(default_invoke(SmallVec::new())),
            custom_invoke: false,
        }
    }

    /// An undecorated constructor candidate. The signature is used verbatim
    /// in diagnostics.
    pub fn constructor(signature: impl Into<String>) -> Self {
        Self::new(CreatorKind::Constructor, signature)
    }

    /// An undecorated factory candidate.
    pub fn factory(signature: impl Into<String>) -> Self {
        Self::new(CreatorKind::Factory, signature)
    }

    /// Attaches an explicit creator mode.
    pub fn mode(mut self, mode: CreatorMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Appends a parameter. A caller-supplied invocation closure is kept;
    /// only the built-in default is rebuilt to track the parameter list.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        if !self.custom_invoke {
            self.invoke = Arc::new(default_invoke(self.params.clone()));
        }
        self
    }

    /// Marks the candidate as not visible (non-public); invisible candidates
    /// are excluded from the implicit-names final fallback.
    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Supplies the invocation closure used to build instances. May be
    /// called before or after [`CreatorCandidate::param`].
    pub fn invoking(
        mut self,
        f: impl Fn(&[Value]) -> BindResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.invoke = Arc::new(f);
        self.custom_invoke = true;
        self
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Diagnostic signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub(crate) fn is_constructor(&self) -> bool {
        self.kind == CreatorKind::Constructor
    }
}

impl fmt::Debug for CreatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatorCandidate")
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("signature", &self.signature)
            .field("arity", &self.params.len())
            .finish()
    }
}

fn default_invoke(params: SmallVec<[ParamSpec; 4]>) -> impl Fn(&[Value]) -> BindResult<Value> {
    move |args: &[Value]| {
        if params.len() == 1 && params[0].resolved_name().is_none() {
            return Ok(args.first().cloned().unwrap_or(Value::Null));
        }
        let mut map = Map::new();
        for (param, arg) in params.iter().zip(args) {
            if let Some(name) = param.resolved_name() {
                map.insert(name.to_string(), arg.clone());
            }
        }
        Ok(Value::Object(map))
    }
}

/// A non-creator property backed by a setter or field.
#[derive(Clone)]
pub struct PropertySpec {
    pub(crate) name: String,
    pub(crate) ty: TypeDescriptor,
    pub(crate) inject_id: Option<String>,
    pub(crate) required: bool,
    pub(crate) back_reference: Option<String>,
    pub(crate) managed_reference: Option<String>,
    pub(crate) apply: ApplyFn,
}

impl PropertySpec {
    /// A property applied by inserting into the instance's object map under
    /// its own name. Providers with real accessors replace the applier via
    /// [`PropertySpec::applying`].
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let name = name.into();
        let key = name.clone();
        Self {
            name,
            ty,
            inject_id: None,
            required: false,
            back_reference: None,
            managed_reference: None,
            apply: Arc::new(move |instance, value| set_field(instance, &key, value)),
        }
    }

    /// Marks the property as populated from an id-keyed injectable source
    /// instead of input data.
    pub fn injected(mut self, id: impl Into<String>) -> Self {
        self.inject_id = Some(id.into());
        self
    }

    /// Marks the property as required input.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the property as a back reference: populated with the enclosing
    /// container under the given reference name.
    pub fn back_reference(mut self, name: impl Into<String>) -> Self {
        self.back_reference = Some(name.into());
        self
    }

    /// Marks the property as the forward half of a managed reference pair.
    pub fn managed_reference(mut self, name: impl Into<String>) -> Self {
        self.managed_reference = Some(name.into());
        self
    }

    /// Supplies the accessor used to write the value into an instance.
    pub fn applying(
        mut self,
        f: impl Fn(&mut Value, Value) -> BindResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.apply = Arc::new(f);
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("ty", &self.ty.to_string())
            .field("inject_id", &self.inject_id)
            .field("back_reference", &self.back_reference)
            .field("managed_reference", &self.managed_reference)
            .finish()
    }
}

pub(crate) fn set_field(instance: &mut Value, key: &str, value: Value) -> BindResult<()> {
    match instance {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        other => Err(BindError::input(format!(
            "cannot set property `{}` on {} instance",
            key,
            crate::descriptor::node_kind(other)
        ))),
    }
}

/// A capture-remaining fallback: accepts arbitrary named input for
/// properties not otherwise bound. At most one may be declared per type.
#[derive(Clone)]
pub struct AnySetterSpec {
    pub(crate) origin: String,
    pub(crate) apply: AnyApplyFn,
}

impl AnySetterSpec {
    /// A fallback that stores unknown fields verbatim in the instance's
    /// object map. `origin` names the declaration site for diagnostics.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            apply: Arc::new(|instance, key, value| set_field(instance, key, value)),
        }
    }

    /// Supplies a custom capture function.
    pub fn applying(
        mut self,
        f: impl Fn(&mut Value, &str, Value) -> BindResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.apply = Arc::new(f);
        self
    }
}

impl fmt::Debug for AnySetterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySetterSpec")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Object-identity declaration: which property carries the id used to
/// resolve forward/duplicate references.
#[derive(Debug, Clone)]
pub struct ObjectIdSpec {
    pub(crate) property: String,
}

impl ObjectIdSpec {
    /// Declares `property` as the id target.
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

/// Everything a provider says about one type: candidates, properties, and
/// class-level policy flags.
///
/// Built fluently; read-only from the engine's perspective.
#[derive(Clone, Default)]
pub struct TypeMetadata {
    pub(crate) constructors: Vec<CreatorCandidate>,
    pub(crate) factories: Vec<CreatorCandidate>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) single_arg_policy: Option<SingleArgPolicy>,
    pub(crate) require_explicit_creator: bool,
    pub(crate) deny_implicit_discovery: bool,
    pub(crate) is_abstract: bool,
    pub(crate) is_inner: bool,
    pub(crate) has_scalar_reducer: bool,
    pub(crate) ignored: AHashSet<String>,
    pub(crate) included: Option<AHashSet<String>>,
    pub(crate) any_setters: Vec<AnySetterSpec>,
    pub(crate) object_id: Option<ObjectIdSpec>,
    pub(crate) shareable: bool,
    pub(crate) instantiators: Vec<Arc<dyn InstantiatorProvider>>,
    pub(crate) modifiers: Vec<Arc<dyn StrategyModifier>>,
}

impl TypeMetadata {
    /// Empty metadata: no candidates, no properties, implicit discovery
    /// allowed, shareable.
    pub fn new() -> Self {
        Self {
            shareable: true,
            ..Self::default()
        }
    }

    /// Adds a constructor candidate (declaration order preserved).
    pub fn with_constructor(mut self, candidate: CreatorCandidate) -> Self {
        debug_assert!(candidate.is_constructor());
        self.constructors.push(candidate);
        self
    }

    /// Adds a factory candidate.
    pub fn with_factory(mut self, candidate: CreatorCandidate) -> Self {
        self.factories.push(candidate);
        self
    }

    /// Adds a setter/field property.
    pub fn with_property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    /// Overrides the process-wide single-argument policy for this type.
    pub fn single_arg_policy(mut self, policy: SingleArgPolicy) -> Self {
        self.single_arg_policy = Some(policy);
        self
    }

    /// Requires explicit creator decoration: implicit discovery passes are
    /// skipped entirely.
    pub fn require_explicit_creator(mut self) -> Self {
        self.require_explicit_creator = true;
        self
    }

    /// Disallows implicit constructor discovery for this type.
    pub fn deny_implicit_discovery(mut self) -> Self {
        self.deny_implicit_discovery = true;
        self
    }

    /// Marks the raw type abstract (affects the unknown-type message).
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Marks the raw type as a non-static inner type (excluded from implicit
    /// constructor discovery).
    pub fn inner_type(mut self) -> Self {
        self.is_inner = true;
        self
    }

    /// Declares that the type exposes a reduce-to-scalar accessor, which the
    /// heuristic single-arg policy reads as a delegation hint.
    pub fn scalar_reducer(mut self) -> Self {
        self.has_scalar_reducer = true;
        self
    }

    /// Adds a property name to the explicit ignore list.
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored.insert(name.into());
        self
    }

    /// Restricts binding to the given property names.
    pub fn include_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Declares a capture-remaining fallback. Declaring more than one is a
    /// definition error reported during binding.
    pub fn with_any_setter(mut self, spec: AnySetterSpec) -> Self {
        self.any_setters.push(spec);
        self
    }

    /// Declares the object-identity target property.
    pub fn with_object_id(mut self, spec: ObjectIdSpec) -> Self {
        self.object_id = Some(spec);
        self
    }

    /// Marks handlers for this type as not safely shareable; they resolve
    /// normally but are never committed to the permanent cache.
    pub fn not_shareable(mut self) -> Self {
        self.shareable = false;
        self
    }

    /// Registers a custom instantiator provider that may short-circuit
    /// creator selection.
    pub fn with_instantiator(mut self, provider: Arc<dyn InstantiatorProvider>) -> Self {
        self.instantiators.push(provider);
        self
    }

    /// Registers a strategy modifier that post-processes the selected
    /// strategy.
    pub fn with_modifier(mut self, modifier: Arc<dyn StrategyModifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Looks up a declared property by name.
    pub(crate) fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }
}

impl fmt::Debug for TypeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMetadata")
            .field("constructors", &self.constructors.len())
            .field("factories", &self.factories.len())
            .field("properties", &self.properties.len())
            .field("is_abstract", &self.is_abstract)
            .field("shareable", &self.shareable)
            .finish()
    }
}

/// In-memory [`MetadataProvider`] keyed by descriptor.
///
/// The usual way to feed the engine in tests and small embeddings: register
/// metadata per type up front, then hand the registry to the cache.
///
/// # Examples
///
/// ```rust
/// use bindery::{MetadataRegistry, MetadataProvider, TypeMetadata, TypeDescriptor};
///
/// let mut registry = MetadataRegistry::new();
/// registry.register(TypeDescriptor::of("Empty"), TypeMetadata::new());
/// assert!(registry.describe(&TypeDescriptor::of("Empty")).is_ok());
/// assert!(registry.describe(&TypeDescriptor::of("Missing")).is_err());
/// ```
#[derive(Default)]
pub struct MetadataRegistry {
    types: ahash::AHashMap<TypeDescriptor, TypeMetadata>,
}

impl MetadataRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers metadata for a type, replacing any previous registration.
    pub fn register(&mut self, ty: TypeDescriptor, metadata: TypeMetadata) -> &mut Self {
        self.types.insert(ty, metadata);
        self
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn describe(&self, ty: &TypeDescriptor) -> BindResult<TypeMetadata> {
        self.types.get(ty).cloned().ok_or_else(|| {
            BindError::unknown_type(ty.clone(), "no metadata registered for this type")
        })
    }
}
