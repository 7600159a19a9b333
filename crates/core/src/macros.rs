// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the crate.
//!
//! - [`string_enum!`] — canonical string form for a unit-variant enum:
//!   a `Display` impl plus its `parse` inverse
//! - [`setters!`] — chainable setter methods for option structs
//! - [`test_builder!`] — builder with test defaults, gated behind the
//!   `test-support` feature

/// Bind a unit-variant enum to its canonical string form.
///
/// Statuses, verdicts, risk levels, and action types all round-trip
/// through storage columns and wire tags; generating `Display` and
/// `parse` from one table keeps the two encodings from drifting apart.
///
/// ```ignore
/// crate::string_enum! {
///     JobStatus {
///         Pending => "pending",
///         Planning => "planning",
///     }
/// }
/// ```
#[macro_export]
macro_rules! string_enum {
    ($name:ident { $( $variant:ident => $str:literal ),+ $(,)? }) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant => $str, )+
                })
            }
        }

        impl $name {
            /// Parse the canonical string form produced by `Display`.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $str => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

/// Generate setter methods inside an existing `impl` block.
///
/// Field groups:
/// - `set { field: Type }` — setter takes `Type` directly
/// - `option { field: Type }` — field is `Option<Type>`, setter wraps
///   `Some(v.into())`
///
/// ```ignore
/// impl CreateJob {
///     crate::setters! {
///         set { priority: Priority }
///         option { dedup_hash: String }
///     }
/// }
/// ```
#[macro_export]
macro_rules! setters {
    (
        $(set {
            $( $set_field:ident : $set_ty:ty ),* $(,)?
        })?
        $(option {
            $( $opt_field:ident : $opt_ty:ty ),* $(,)?
        })?
    ) => {
        $($(
            pub fn $set_field(mut self, v: $set_ty) -> Self {
                self.$set_field = v;
                self
            }
        )*)?

        $($(
            pub fn $opt_field(mut self, v: impl Into<$opt_ty>) -> Self {
                self.$opt_field = Some(v.into());
                self
            }
        )*)?
    };
}

/// Generate a test builder: a struct of overridable fields, a
/// `Target::builder()` constructor seeded with the listed defaults, and
/// a `build()` that assembles the target.
///
/// Everything generated is gated behind `#[cfg(any(test, feature =
/// "test-support"))]`; production code constructs the targets directly.
///
/// Field groups:
/// - `into { field: Type = default }` — setter and default both go
///   through `Into<Type>` (string-ish fields)
/// - `set { field: Type = default }` — setter takes `Type` directly
/// - `option { field: Type = default }` — builder field is
///   `Option<Type>`, setter wraps `Some(v.into())`
/// - `computed { field: Type = expr }` — no setter; the expression runs
///   at `build()` time (fresh ids)
#[macro_export]
macro_rules! test_builder {
    (
        pub struct $builder:ident => $target:ident {
            $(into {
                $( $into_field:ident : $into_ty:ty = $into_default:expr ),* $(,)?
            })?
            $(set {
                $( $set_field:ident : $set_ty:ty = $set_default:expr ),* $(,)?
            })?
            $(option {
                $( $opt_field:ident : $opt_ty:ty = $opt_default:expr ),* $(,)?
            })?
            $(computed {
                $( $comp_field:ident : $comp_ty:ty = $comp_expr:expr ),* $(,)?
            })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $($( $into_field: $into_ty, )*)?
            $($( $set_field: $set_ty, )*)?
            $($( $opt_field: Option<$opt_ty>, )*)?
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            /// Builder seeded with test defaults.
            pub fn builder() -> $builder {
                $builder {
                    $($( $into_field: $into_default.into(), )*)?
                    $($( $set_field: $set_default, )*)?
                    $($( $opt_field: $opt_default, )*)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $($(
                pub fn $into_field(mut self, v: impl Into<$into_ty>) -> Self {
                    self.$into_field = v.into();
                    self
                }
            )*)?

            $($(
                pub fn $set_field(mut self, v: $set_ty) -> Self {
                    self.$set_field = v;
                    self
                }
            )*)?

            $($(
                pub fn $opt_field(mut self, v: impl Into<$opt_ty>) -> Self {
                    self.$opt_field = Some(v.into());
                    self
                }
            )*)?

            pub fn build(self) -> $target {
                $target {
                    $($( $into_field: self.$into_field, )*)?
                    $($( $set_field: self.$set_field, )*)?
                    $($( $opt_field: self.$opt_field, )*)?
                    $($( $comp_field: $comp_expr, )*)?
                }
            }
        }
    };
}
