//! Creator selection: picks exactly one instantiation strategy per type.
//!
//! Selection runs four passes over the candidates supplied by the metadata
//! provider (explicit factories, explicit constructors, implicit
//! constructors, implicit factories) and classifies each considered
//! candidate as default, scalar-delegating, generic-delegating, or
//! properties-based. The first successful phase wins per creator arity;
//! contradictory metadata is a definition error and is never retried.

use std::fmt;

use smallvec::SmallVec;
use tracing::debug;

use crate::config::{BindConfig, SingleArgPolicy};
use crate::descriptor::{ScalarKind, TypeDescriptor, SCALAR_KINDS};
use crate::error::{BindError, BindResult};
use crate::metadata::{CreatorCandidate, CreatorMode, InvokeFn, TypeMetadata};

/// Discriminates the four strategy shapes without exposing their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationKind {
    /// Zero-argument creator.
    Default,
    /// One or more single-scalar creators, dispatched by input shape.
    Scalar,
    /// Single opaque delegate value, optionally with injected extras.
    Delegating,
    /// Named/injected parameter set.
    Properties,
}

/// A creator parameter bound into a properties-based strategy.
#[derive(Debug, Clone)]
pub struct CreatorParam {
    /// Position in the creator's parameter list.
    pub index: usize,
    /// Logical property name; `None` only for purely injected parameters.
    pub name: Option<String>,
    /// Injectable-source id, if the parameter is injected.
    pub inject_id: Option<String>,
    /// Declared parameter type.
    pub ty: TypeDescriptor,
}

/// One scalar creator: signature for diagnostics plus the invocation.
#[derive(Clone)]
pub struct ScalarCreator {
    pub(crate) signature: String,
    pub(crate) invoke: InvokeFn,
}

/// Per-kind table of scalar creators; distinct kinds coexist on one type.
#[derive(Clone, Default)]
pub struct ScalarCreators {
    table: [Option<ScalarCreator>; SCALAR_KINDS],
}

impl ScalarCreators {
    pub(crate) fn get(&self, kind: ScalarKind) -> Option<&ScalarCreator> {
        self.table[kind.index()].as_ref()
    }

    /// The kinds for which a creator is present.
    pub fn kinds(&self) -> Vec<ScalarKind> {
        use ScalarKind::*;
        [Text, Int, Long, Double, Boolean, BigInteger, BigDecimal]
            .into_iter()
            .filter(|k| self.table[k.index()].is_some())
            .collect()
    }

    fn insert(&mut self, kind: ScalarKind, creator: ScalarCreator) -> Result<(), String> {
        match &self.table[kind.index()] {
            Some(prev) => Err(prev.signature.clone()),
            None => {
                self.table[kind.index()] = Some(creator);
                Ok(())
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.table.iter().all(Option::is_none)
    }
}

/// The selected instantiation strategy for a type.
///
/// Exactly one strategy is active per type: never zero, never more than one.
/// Immutable after selection; the handler assembler consumes it as-is.
#[derive(Clone)]
pub enum Instantiation {
    /// Build with a zero-argument creator, then populate properties.
    Default {
        /// Creator signature for diagnostics.
        signature: String,
        /// Zero-argument invocation.
        invoke: InvokeFn,
    },
    /// Build from a single well-known scalar input.
    Scalar {
        /// Per-kind creator table.
        creators: ScalarCreators,
    },
    /// Build by passing the whole input through a single delegate parameter.
    Delegating {
        /// Creator signature for diagnostics.
        signature: String,
        /// Invocation taking `arity` ordered arguments.
        invoke: InvokeFn,
        /// Total parameter count.
        arity: usize,
        /// Position of the delegate parameter.
        delegate_index: usize,
        /// Declared type of the delegate parameter.
        delegate_ty: TypeDescriptor,
        /// Purely-injected extras: `(parameter index, injectable id)`.
        injected: SmallVec<[(usize, String); 2]>,
    },
    /// Build from named/injected creator parameters.
    Properties {
        /// Creator signature for diagnostics.
        signature: String,
        /// Invocation taking one argument per parameter, in order.
        invoke: InvokeFn,
        /// Bound creator parameters, in declaration order.
        params: Vec<CreatorParam>,
    },
}

impl Instantiation {
    /// Builds a default (zero-argument) strategy; intended for
    /// [`InstantiatorProvider`](crate::InstantiatorProvider) implementations.
    pub fn default_creator(
        signature: impl Into<String>,
        invoke: impl Fn(&[serde_json::Value]) -> BindResult<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        Instantiation::Default {
            signature: signature.into(),
            invoke: std::sync::Arc::new(invoke),
        }
    }

    /// The strategy's shape.
    pub fn kind(&self) -> InstantiationKind {
        match self {
            Instantiation::Default { .. } => InstantiationKind::Default,
            Instantiation::Scalar { .. } => InstantiationKind::Scalar,
            Instantiation::Delegating { .. } => InstantiationKind::Delegating,
            Instantiation::Properties { .. } => InstantiationKind::Properties,
        }
    }

    /// Bound creator parameters; empty unless properties-based.
    pub fn params(&self) -> &[CreatorParam] {
        match self {
            Instantiation::Properties { params, .. } => params,
            _ => &[],
        }
    }

    pub(crate) fn signature(&self) -> &str {
        match self {
            Instantiation::Default { signature, .. }
            | Instantiation::Delegating { signature, .. }
            | Instantiation::Properties { signature, .. } => signature,
            Instantiation::Scalar { .. } => "<scalar creators>",
        }
    }
}

// Closures make a derived Debug impossible; keep the output short.
impl fmt::Debug for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instantiation::Default { signature, .. } => write!(f, "Default({})", signature),
            Instantiation::Scalar { creators } => write!(f, "Scalar({:?})", creators.kinds()),
            Instantiation::Delegating {
                signature,
                delegate_index,
                ..
            } => write!(f, "Delegating({} @ #{})", signature, delegate_index),
            Instantiation::Properties {
                signature, params, ..
            } => write!(f, "Properties({}, {} params)", signature, params.len()),
        }
    }
}

/// Selects the instantiation strategy for `ty` from the candidates in
/// `meta`, honoring the process-wide `config`.
///
/// This is a pure function of its inputs; all selection state is local.
pub fn select_instantiation(
    ty: &TypeDescriptor,
    meta: &TypeMetadata,
    config: &BindConfig,
) -> BindResult<Instantiation> {
    for provider in &meta.instantiators {
        if let Some(strategy) = provider.find_instantiation(ty, meta) {
            debug!(ty = %ty, provider = provider.name(), "instantiator provider short-circuited selection");
            return apply_modifiers(ty, meta, strategy);
        }
    }

    let policy = meta.single_arg_policy.unwrap_or(config.single_arg_default());
    let mut sel = Selection::new(ty);

    // Pass 1: factories with an explicit mode.
    let mut explicit_ctor = false;
    for cand in &meta.factories {
        match cand.mode {
            None | Some(CreatorMode::Disabled) => {}
            Some(mode) => sel.classify_explicit(cand, mode, meta, policy)?,
        }
    }

    // Pass 2: constructors with an explicit mode. An undecorated zero-arg
    // constructor is always captured as the default fallback; a decorated
    // zero-arg creator takes precedence over it.
    for cand in &meta.constructors {
        match cand.mode {
            None => {
                if cand.arity() == 0 {
                    sel.capture_default(cand, false);
                }
            }
            Some(CreatorMode::Disabled) => {}
            Some(mode) => {
                explicit_ctor = true;
                sel.classify_explicit(cand, mode, meta, policy)?;
            }
        }
    }

    // Pass 3: implicit constructors. Only when no explicit constructor
    // claimed any arity and the type is eligible for discovery.
    let implicit_allowed = !explicit_ctor
        && !meta.require_explicit_creator
        && !meta.deny_implicit_discovery
        && !meta.is_abstract
        && !meta.is_inner;
    let mut implicit_matched = false;
    if implicit_allowed {
        let mut queued: Vec<&CreatorCandidate> = Vec::new();
        for cand in &meta.constructors {
            if cand.mode.is_some() || cand.arity() == 0 {
                continue;
            }
            if cand.arity() == 1 {
                let p = &cand.params[0];
                match (p.ty.scalar_kind(), &p.inject_id) {
                    (Some(kind), None) => {
                        sel.add_scalar(kind, cand)?;
                        implicit_matched = true;
                    }
                    _ => {
                        if p.is_named_or_injected() {
                            queued.push(cand);
                        }
                    }
                }
            } else if cand.params.iter().all(|p| p.is_named_or_injected()) {
                queued.push(cand);
            }
        }

        // Final fallback: visible constructors whose every parameter
        // resolves an implicit name (or injection). Exactly one qualifier is
        // adopted as properties-based; ambiguity silently abandons the
        // fallback rather than raising an error.
        if sel.properties.is_none() && sel.delegating.is_none() {
            let qualified: Vec<&&CreatorCandidate> = queued
                .iter()
                .filter(|c| {
                    c.visible
                        && c.params
                            .iter()
                            .all(|p| p.implicit_name.is_some() || p.inject_id.is_some())
                })
                .collect();
            if qualified.len() == 1 {
                let cand = qualified[0];
                sel.set_properties(make_implicit_properties(ty, cand)?)?;
                implicit_matched = true;
            }
        }
    }

    // Pass 4: implicit factories. Only single-argument factories are ever
    // considered; multi-argument undecorated factories are not creators.
    if !explicit_ctor && !implicit_matched {
        for cand in &meta.factories {
            if cand.mode.is_some() || cand.arity() != 1 {
                continue;
            }
            let p = &cand.params[0];
            if let (Some(kind), None) = (p.ty.scalar_kind(), &p.inject_id) {
                sel.add_scalar(kind, cand)?;
            }
        }
    }

    let strategy = sel.finish(meta)?;
    apply_modifiers(ty, meta, strategy)
}

fn apply_modifiers(
    ty: &TypeDescriptor,
    meta: &TypeMetadata,
    mut strategy: Instantiation,
) -> BindResult<Instantiation> {
    for modifier in &meta.modifiers {
        strategy =
            modifier
                .modify(ty, meta, strategy)
                .ok_or_else(|| BindError::ExtensionContract {
                    ty: ty.clone(),
                    extension: modifier.name().to_string(),
                })?;
    }
    debug!(ty = %ty, strategy = ?strategy, "selected instantiation strategy");
    Ok(strategy)
}

/// Local selection state; converted into the final strategy by `finish`.
struct Selection<'t> {
    ty: &'t TypeDescriptor,
    default_creator: Option<(String, InvokeFn, bool)>,
    scalars: ScalarCreators,
    delegating: Option<Instantiation>,
    properties: Option<Instantiation>,
}

impl<'t> Selection<'t> {
    fn new(ty: &'t TypeDescriptor) -> Self {
        Self {
            ty,
            default_creator: None,
            scalars: ScalarCreators::default(),
            delegating: None,
            properties: None,
        }
    }

    fn classify_explicit(
        &mut self,
        cand: &CreatorCandidate,
        mode: CreatorMode,
        meta: &TypeMetadata,
        policy: SingleArgPolicy,
    ) -> BindResult<()> {
        if cand.arity() == 0 {
            self.capture_default(cand, true);
            return Ok(());
        }
        match mode {
            CreatorMode::Disabled => Ok(()),
            CreatorMode::Delegating => self.route(make_delegating(self.ty, cand)?),
            CreatorMode::Properties => self.set_properties(make_properties(self.ty, cand)?),
            CreatorMode::Default => {
                if cand.arity() == 1 {
                    self.classify_single(cand, meta, policy)
                } else {
                    self.classify_multi(cand)
                }
            }
        }
    }

    /// Multi-argument classification for decorated creators with an
    /// unspecified mode: every parameter explicitly named or injected means
    /// properties-based; exactly one free parameter means delegating; more
    /// is a definition error at the first offender.
    fn classify_multi(&mut self, cand: &CreatorCandidate) -> BindResult<()> {
        let free: Vec<usize> = cand
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.explicit_name.is_none() && p.inject_id.is_none())
            .map(|(i, _)| i)
            .collect();
        match free.len() {
            0 => self.set_properties(make_properties(self.ty, cand)?),
            1 => self.route(make_delegating(self.ty, cand)?),
            _ => Err(BindError::definition(
                self.ty.clone(),
                "argument is neither explicitly named nor injectable",
            )
            .with_candidate(cand.signature.clone())
            .with_param(free[0])),
        }
    }

    fn classify_single(
        &mut self,
        cand: &CreatorCandidate,
        meta: &TypeMetadata,
        policy: SingleArgPolicy,
    ) -> BindResult<()> {
        let p = &cand.params[0];
        match policy {
            SingleArgPolicy::Delegating => self.route(make_delegating(self.ty, cand)?),
            SingleArgPolicy::Properties => {
                if p.is_named_or_injected() {
                    self.set_properties(make_properties(self.ty, cand)?)
                } else {
                    Err(BindError::definition(
                        self.ty.clone(),
                        "single creator parameter must resolve a name or be injectable \
                         for properties-based binding",
                    )
                    .with_candidate(cand.signature.clone())
                    .with_param(0))
                }
            }
            SingleArgPolicy::RequireMode => Err(BindError::definition(
                self.ty.clone(),
                "single-argument creator must declare an explicit mode",
            )
            .with_candidate(cand.signature.clone())),
            SingleArgPolicy::Heuristic => {
                let as_properties = p.explicit_name.is_some()
                    || (!meta.has_scalar_reducer
                        && (p.inject_id.is_some()
                            || p.implicit_name
                                .as_deref()
                                .is_some_and(|n| meta.property(n).is_some())));
                if as_properties {
                    self.set_properties(make_properties(self.ty, cand)?)
                } else {
                    self.route(make_delegating(self.ty, cand)?)
                }
            }
        }
    }

    fn route(&mut self, classified: Classified) -> BindResult<()> {
        match classified {
            Classified::Scalar(kind, creator) => self.insert_scalar(kind, creator),
            Classified::Delegating(inst) => self.set_delegating(inst),
        }
    }

    fn add_scalar(&mut self, kind: ScalarKind, cand: &CreatorCandidate) -> BindResult<()> {
        check_unwrap(self.ty, cand)?;
        self.insert_scalar(
            kind,
            ScalarCreator {
                signature: cand.signature.clone(),
                invoke: cand.invoke.clone(),
            },
        )
    }

    fn insert_scalar(&mut self, kind: ScalarKind, creator: ScalarCreator) -> BindResult<()> {
        let signature = creator.signature.clone();
        self.scalars.insert(kind, creator).map_err(|prev| {
            BindError::definition(
                self.ty.clone(),
                format!(
                    "conflicting {:?} scalar creators: {} and {}",
                    kind, prev, signature
                ),
            )
            .with_candidate(signature.clone())
        })
    }

    fn set_delegating(&mut self, inst: Instantiation) -> BindResult<()> {
        if let Some(prev) = &self.delegating {
            return Err(BindError::definition(
                self.ty.clone(),
                format!(
                    "conflicting delegating creators: {} and {}",
                    prev.signature(),
                    inst.signature()
                ),
            )
            .with_candidate(inst.signature().to_string()));
        }
        self.delegating = Some(inst);
        Ok(())
    }

    fn set_properties(&mut self, inst: Instantiation) -> BindResult<()> {
        if let Some(prev) = &self.properties {
            return Err(BindError::definition(
                self.ty.clone(),
                format!(
                    "conflicting properties-based creators: {} and {}",
                    prev.signature(),
                    inst.signature()
                ),
            )
            .with_candidate(inst.signature().to_string()));
        }
        self.properties = Some(inst);
        Ok(())
    }

    fn capture_default(&mut self, cand: &CreatorCandidate, decorated: bool) {
        let taken_by_decorated = matches!(&self.default_creator, Some((_, _, true)));
        if decorated && !taken_by_decorated {
            self.default_creator = Some((cand.signature.clone(), cand.invoke.clone(), true));
        } else if self.default_creator.is_none() {
            self.default_creator = Some((cand.signature.clone(), cand.invoke.clone(), false));
        }
    }

    fn finish(self, meta: &TypeMetadata) -> BindResult<Instantiation> {
        if let Some(inst) = self.properties {
            return Ok(inst);
        }
        if let Some(inst) = self.delegating {
            return Ok(inst);
        }
        if !self.scalars.is_empty() {
            return Ok(Instantiation::Scalar {
                creators: self.scalars,
            });
        }
        if let Some((signature, invoke, _)) = self.default_creator {
            return Ok(Instantiation::Default { signature, invoke });
        }
        let message = if meta.is_abstract {
            "cannot construct instance of abstract type: add a creator or map a concrete subtype"
        } else {
            "no creators found: define a default constructor, decorate a creator, \
             or register an instantiator"
        };
        Err(BindError::unknown_type(self.ty.clone(), message))
    }
}

enum Classified {
    Scalar(ScalarKind, ScalarCreator),
    Delegating(Instantiation),
}

fn check_unwrap(ty: &TypeDescriptor, cand: &CreatorCandidate) -> BindResult<()> {
    if let Some((idx, _)) = cand.params.iter().enumerate().find(|(_, p)| p.unwrap) {
        return Err(BindError::definition(
            ty.clone(),
            "unwrap marker is not supported on creator parameters",
        )
        .with_candidate(cand.signature.clone())
        .with_param(idx));
    }
    Ok(())
}

/// Classifies a delegating candidate. The delegate is the unique parameter
/// lacking both an explicit name and an injection source; everything else
/// must be injected.
fn make_delegating(ty: &TypeDescriptor, cand: &CreatorCandidate) -> BindResult<Classified> {
    check_unwrap(ty, cand)?;
    let free: Vec<usize> = cand
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.explicit_name.is_none() && p.inject_id.is_none())
        .map(|(i, _)| i)
        .collect();
    let delegate_index = match free.len() {
        1 => free[0],
        0 => {
            return Err(BindError::definition(ty.clone(), "no valid delegate parameter")
                .with_candidate(cand.signature.clone()))
        }
        _ => {
            return Err(BindError::definition(
                ty.clone(),
                format!(
                    "conflicting delegate candidates at parameters #{} and #{}",
                    free[0], free[1]
                ),
            )
            .with_candidate(cand.signature.clone())
            .with_param(free[0]))
        }
    };
    for (i, p) in cand.params.iter().enumerate() {
        if i != delegate_index && p.inject_id.is_none() {
            return Err(BindError::definition(
                ty.clone(),
                "non-delegate parameter of a delegating creator must be injectable",
            )
            .with_candidate(cand.signature.clone())
            .with_param(i));
        }
    }

    let delegate_ty = cand.params[delegate_index].ty.clone();
    if cand.arity() == 1 {
        if let Some(kind) = delegate_ty.scalar_kind() {
            return Ok(Classified::Scalar(
                kind,
                ScalarCreator {
                    signature: cand.signature.clone(),
                    invoke: cand.invoke.clone(),
                },
            ));
        }
    }
    Ok(Classified::Delegating(Instantiation::Delegating {
        signature: cand.signature.clone(),
        invoke: cand.invoke.clone(),
        arity: cand.arity(),
        delegate_index,
        delegate_ty,
        injected: cand
            .params
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.inject_id.clone().map(|id| (i, id)))
            .collect(),
    }))
}

/// Classifies a properties-based candidate: every parameter needs a resolved
/// name (explicit or implicit) or an injection source.
fn make_properties(ty: &TypeDescriptor, cand: &CreatorCandidate) -> BindResult<Instantiation> {
    check_unwrap(ty, cand)?;
    let mut params = Vec::with_capacity(cand.arity());
    for (i, p) in cand.params.iter().enumerate() {
        if !p.is_named_or_injected() {
            return Err(BindError::definition(
                ty.clone(),
                "creator parameter has no name and is not injectable",
            )
            .with_candidate(cand.signature.clone())
            .with_param(i));
        }
        params.push(CreatorParam {
            index: i,
            name: p.resolved_name().map(str::to_string),
            inject_id: p.inject_id.clone(),
            ty: p.ty.clone(),
        });
    }
    Ok(Instantiation::Properties {
        signature: cand.signature.clone(),
        invoke: cand.invoke.clone(),
        params,
    })
}

/// Adopts an implicit-fallback constructor as properties-based, preferring
/// implicit parameter names.
fn make_implicit_properties(
    ty: &TypeDescriptor,
    cand: &CreatorCandidate,
) -> BindResult<Instantiation> {
    check_unwrap(ty, cand)?;
    let params = cand
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| CreatorParam {
            index: i,
            name: p
                .implicit_name
                .clone()
                .or_else(|| p.explicit_name.clone()),
            inject_id: p.inject_id.clone(),
            ty: p.ty.clone(),
        })
        .collect();
    Ok(Instantiation::Properties {
        signature: cand.signature.clone(),
        invoke: cand.invoke.clone(),
        params,
    })
}
