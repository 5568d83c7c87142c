// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed opaque identifiers.
//!
//! Every generated ID is `{prefix}{nanoid}`: a 3-character type indicator
//! (e.g. `lp-`, `sa-`) followed by a 16-character nanoid. Parsing accepts any
//! non-empty string so IDs created by older versions keep resolving.

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random ID with the type prefix.
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, nanoid::nanoid!(16)))
            }

            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Truncated form for display in tables.
            pub fn short(&self, n: usize) -> &str {
                short(&self.0, n)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id!(
    /// Identifies a loop run and its on-disk state file.
    LoopId, "lp-"
);
define_id!(
    /// Identifies a subagent within an orchestrated workspace.
    SubagentId, "sa-"
);
define_id!(
    /// Identifies a finding appended by a subagent.
    FindingId, "fd-"
);
define_id!(
    /// Identifies a handoff message between subagents.
    HandoffId, "hf-"
);
define_id!(
    /// Identifies a checkpoint created by a checkpoint backend.
    CheckpointId, "ck-"
);
define_id!(
    /// Identifies a timeline entry in the undo store.
    EntryId, "un-"
);

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
