//! Extension points for customizing creator selection.
//!
//! Providers may short-circuit selection with a ready-made strategy;
//! modifiers post-process whatever selection produced. Both are registered
//! per type through [`TypeMetadata`](crate::TypeMetadata).

use crate::creator::Instantiation;
use crate::descriptor::TypeDescriptor;
use crate::metadata::TypeMetadata;

/// Supplies a complete instantiation strategy for a type, bypassing the
/// built-in selection passes.
///
/// Providers are consulted in registration order; the first one returning
/// `Some` wins. Returning `None` means "not mine" and is perfectly legal.
///
/// # Examples
///
/// ```rust
/// use bindery::{InstantiatorProvider, Instantiation, TypeDescriptor, TypeMetadata};
/// use serde_json::json;
///
/// struct FixedWidget;
///
/// impl InstantiatorProvider for FixedWidget {
///     fn find_instantiation(
///         &self,
///         ty: &TypeDescriptor,
///         _meta: &TypeMetadata,
///     ) -> Option<Instantiation> {
///         if ty.name() == "Widget" {
///             Some(Instantiation::default_creator("Widget()", |_| {
///                 Ok(json!({"fixed": true}))
///             }))
///         } else {
///             None
///         }
///     }
/// }
/// ```
pub trait InstantiatorProvider: Send + Sync {
    /// Diagnostic name, used when reporting contract violations.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns a strategy for `ty`, or `None` to let selection proceed.
    fn find_instantiation(
        &self,
        ty: &TypeDescriptor,
        meta: &TypeMetadata,
    ) -> Option<Instantiation>;
}

/// Post-processes the selected instantiation strategy.
///
/// Modifiers run in registration order, each receiving the previous result.
/// A modifier must return a strategy (the unchanged input is fine);
/// returning `None` is a contract violation surfaced as an
/// extension-contract error naming the modifier.
pub trait StrategyModifier: Send + Sync {
    /// Diagnostic name, used when reporting contract violations.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Replaces or passes through the selected strategy.
    fn modify(
        &self,
        ty: &TypeDescriptor,
        meta: &TypeMetadata,
        strategy: Instantiation,
    ) -> Option<Instantiation>;
}
