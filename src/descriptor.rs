//! Type descriptors used as cache keys and binding targets.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{BindError, BindResult};

/// Custom build override attached to a descriptor.
///
/// When present, the resolution cache bypasses both lookup and memoization
/// for the descriptor and hands input straight to the override.
pub type OverrideFn = Arc<dyn Fn(&Value) -> BindResult<Value> + Send + Sync>;

/// Identity of a type being resolved: raw class name plus generic bindings.
///
/// Descriptors are the key of the handler cache and must therefore support
/// cheap cloning, value equality and hashing. Equality and hashing cover the
/// raw name, the generic arguments, and the scalar classification; an
/// attached build override is deliberately excluded so that `T` and
/// `T`-with-override address the same cache slot (the cache skips the slot
/// when an override is present).
///
/// # Examples
///
/// ```rust
/// use bindery::TypeDescriptor;
///
/// let list_of_points = TypeDescriptor::with_args("List", vec![TypeDescriptor::of("Point")]);
/// assert_eq!(list_of_points.to_string(), "List<Point>");
/// assert_eq!(list_of_points, list_of_points.clone());
///
/// let text = TypeDescriptor::text();
/// assert!(text.scalar_kind().is_some());
/// ```
#[derive(Clone)]
pub struct TypeDescriptor {
    raw: Arc<str>,
    args: Arc<[TypeDescriptor]>,
    scalar: Option<ScalarKind>,
    override_build: Option<OverrideFn>,
}

impl TypeDescriptor {
    /// Creates a descriptor for a non-generic, non-scalar type.
    pub fn of(raw: impl Into<Arc<str>>) -> Self {
        Self {
            raw: raw.into(),
            args: Arc::from([]),
            scalar: None,
            override_build: None,
        }
    }

    /// Creates a descriptor with generic bindings.
    pub fn with_args(raw: impl Into<Arc<str>>, args: Vec<TypeDescriptor>) -> Self {
        Self {
            raw: raw.into(),
            args: args.into(),
            scalar: None,
            override_build: None,
        }
    }

    fn scalar_of(raw: &'static str, kind: ScalarKind) -> Self {
        Self {
            raw: Arc::from(raw),
            args: Arc::from([]),
            scalar: Some(kind),
            override_build: None,
        }
    }

    /// Text / character-sequence scalar.
    pub fn text() -> Self {
        Self::scalar_of("string", ScalarKind::Text)
    }

    /// 32-bit integer scalar.
    pub fn int() -> Self {
        Self::scalar_of("int", ScalarKind::Int)
    }

    /// 64-bit integer scalar.
    pub fn long() -> Self {
        Self::scalar_of("long", ScalarKind::Long)
    }

    /// Double-precision floating point scalar.
    pub fn double() -> Self {
        Self::scalar_of("double", ScalarKind::Double)
    }

    /// Boolean scalar.
    pub fn boolean() -> Self {
        Self::scalar_of("boolean", ScalarKind::Boolean)
    }

    /// Arbitrary-precision integer scalar.
    pub fn big_integer() -> Self {
        Self::scalar_of("biginteger", ScalarKind::BigInteger)
    }

    /// Arbitrary-precision decimal scalar.
    pub fn big_decimal() -> Self {
        Self::scalar_of("bigdecimal", ScalarKind::BigDecimal)
    }

    /// The opaque "any" type: subtrees bound to it pass through verbatim.
    pub fn any() -> Self {
        Self::of("any")
    }

    /// Raw class name.
    pub fn name(&self) -> &str {
        &self.raw
    }

    /// Generic bindings, outermost first.
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.args
    }

    /// Scalar classification, if this is one of the well-known scalar types.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        self.scalar
    }

    /// Whether this is the opaque "any" type.
    pub fn is_any(&self) -> bool {
        self.scalar.is_none() && &*self.raw == "any"
    }

    /// Returns a copy of this descriptor with a custom build override
    /// attached. The override is excluded from equality and hashing.
    pub fn with_override(
        &self,
        f: impl Fn(&Value) -> BindResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            raw: self.raw.clone(),
            args: self.args.clone(),
            scalar: self.scalar,
            override_build: Some(Arc::new(f)),
        }
    }

    /// The attached build override, if any.
    pub fn build_override(&self) -> Option<&OverrideFn> {
        self.override_build.as_ref()
    }
}

// Equality ignores the attached override: the override gates cache behavior,
// it is not part of the type's identity.
impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.scalar == other.scalar && self.args == other.args
    }
}

impl Eq for TypeDescriptor {}

impl std::hash::Hash for TypeDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
        self.scalar.hash(state);
        for arg in self.args.iter() {
            arg.hash(state);
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("raw", &self.raw)
            .field("args", &self.args)
            .field("scalar", &self.scalar)
            .field("override", &self.override_build.is_some())
            .finish()
    }
}

/// Well-known scalar kinds eligible for dedicated scalar-delegating creators.
///
/// A creator taking exactly one non-injected parameter of one of these kinds
/// is always eligible for the scalar-delegating strategy; creators for
/// distinct kinds may coexist on a single type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Text / character sequence.
    Text,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Double-precision floating point.
    Double,
    /// Boolean.
    Boolean,
    /// Arbitrary-precision integer.
    BigInteger,
    /// Arbitrary-precision decimal.
    BigDecimal,
}

/// Number of scalar kinds; sizes the per-kind creator table.
pub(crate) const SCALAR_KINDS: usize = 7;

impl ScalarKind {
    /// Stable index into per-kind tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            ScalarKind::Text => 0,
            ScalarKind::Int => 1,
            ScalarKind::Long => 2,
            ScalarKind::Double => 3,
            ScalarKind::Boolean => 4,
            ScalarKind::BigInteger => 5,
            ScalarKind::BigDecimal => 6,
        }
    }

    /// Checks that `value` fits this kind and returns the coerced argument
    /// to hand to the creator.
    ///
    /// Arbitrary-precision kinds accept both numbers and their textual form;
    /// everything else is strict about the node shape.
    pub fn coerce(self, value: &Value) -> BindResult<Value> {
        match (self, value) {
            (ScalarKind::Text, Value::String(_)) => Ok(value.clone()),
            (ScalarKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (ScalarKind::Int, Value::Number(n)) => match n.as_i64() {
                Some(i) if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) => {
                    Ok(value.clone())
                }
                _ => Err(BindError::input(format!("value {} out of int range", n))),
            },
            (ScalarKind::Long, Value::Number(n)) if n.as_i64().is_some() => Ok(value.clone()),
            (ScalarKind::Double, Value::Number(_)) => Ok(value.clone()),
            (ScalarKind::BigInteger, Value::Number(n)) if !n.is_f64() => Ok(value.clone()),
            (ScalarKind::BigInteger, Value::String(s)) => {
                let digits = s.strip_prefix('-').unwrap_or(s);
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    Ok(value.clone())
                } else {
                    Err(BindError::input(format!("`{}` is not an integer", s)))
                }
            }
            (ScalarKind::BigDecimal, Value::Number(_)) => Ok(value.clone()),
            (ScalarKind::BigDecimal, Value::String(s)) => {
                if s.parse::<f64>().is_ok() {
                    Ok(value.clone())
                } else {
                    Err(BindError::input(format!("`{}` is not a decimal", s)))
                }
            }
            _ => Err(BindError::input(format!(
                "cannot coerce {} input to {:?}",
                node_kind(value),
                self
            ))),
        }
    }
}

pub(crate) fn node_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
