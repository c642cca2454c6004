//! The three channel families and a container keyed by family.
//!
//! The source system carries Messages/Responses/Gemini as three near-duplicated
//! code paths. Every stateful component in this workspace (metrics, scheduler,
//! usage, rate limiter) is generic over one family's worth of state and is
//! instantiated three times via [`PerFamily`] rather than copy-pasted.

use std::fmt;

/// One of the three client-facing endpoint families.
///
/// Selects both the inbound endpoint shape (`/v1/messages`, `/v1/responses`,
/// the Gemini family) and the upstream protocol dialect used to forward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Family {
    /// Anthropic-style `/v1/messages`.
    Messages,
    /// OpenAI-style `/v1/responses`.
    Responses,
    /// Gemini family.
    Gemini,
}

impl Family {
    /// All families, in a stable order used for iteration and admin listings.
    pub const ALL: [Family; 3] = [Family::Messages, Family::Responses, Family::Gemini];

    /// The `{family}` path segment this family is addressed by on the admin API.
    pub fn admin_path_segment(self) -> &'static str {
        match self {
            Family::Messages => "channels",
            Family::Responses => "responses/channels",
            Family::Gemini => "gemini/channels",
        }
    }

    /// The query-string value this family is addressed by on `/api/scheduler/stats`.
    pub fn query_value(self) -> &'static str {
        match self {
            Family::Messages => "messages",
            Family::Responses => "responses",
            Family::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Messages => "messages",
            Family::Responses => "responses",
            Family::Gemini => "gemini",
        })
    }
}

/// A value replicated once per [`Family`], replacing three hand-copied fields.
#[derive(Debug, Clone, Default)]
pub struct PerFamily<T> {
    messages: T,
    responses: T,
    gemini: T,
}

impl<T> PerFamily<T> {
    /// Builds one instance per family from a constructor.
    pub fn from_fn(mut f: impl FnMut(Family) -> T) -> Self {
        Self {
            messages: f(Family::Messages),
            responses: f(Family::Responses),
            gemini: f(Family::Gemini),
        }
    }

    /// Borrows the value for a given family.
    pub fn get(&self, family: Family) -> &T {
        match family {
            Family::Messages => &self.messages,
            Family::Responses => &self.responses,
            Family::Gemini => &self.gemini,
        }
    }

    /// Mutably borrows the value for a given family.
    pub fn get_mut(&mut self, family: Family) -> &mut T {
        match family {
            Family::Messages => &mut self.messages,
            Family::Responses => &mut self.responses,
            Family::Gemini => &mut self.gemini,
        }
    }

    /// Iterates over `(family, value)` pairs in [`Family::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Family, &T)> {
        Family::ALL.into_iter().map(move |family| (family, self.get(family)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_family_routes_to_the_right_slot() {
        let pf = PerFamily::from_fn(|f| f.to_string());
        assert_eq!(pf.get(Family::Messages), "messages");
        assert_eq!(pf.get(Family::Responses), "responses");
        assert_eq!(pf.get(Family::Gemini), "gemini");
    }

    #[test]
    fn iter_visits_all_three_in_stable_order() {
        let pf = PerFamily::from_fn(|f| f);
        let seen: Vec<Family> = pf.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, Family::ALL.to_vec());
    }

    #[test]
    fn admin_path_segments_match_the_spec() {
        assert_eq!(Family::Messages.admin_path_segment(), "channels");
        assert_eq!(Family::Responses.admin_path_segment(), "responses/channels");
        assert_eq!(Family::Gemini.admin_path_segment(), "gemini/channels");
    }
}
