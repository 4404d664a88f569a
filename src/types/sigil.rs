//! Witness sigils, optionally qualified by a layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Identifier of a witness, optionally qualified by a layer name.
///
/// Displayed as `A` for the base witness and `A (a.c.)` for a layer.
/// A layer is its own alignment column, but its path through a section
/// falls back to the base witness wherever it carries no edge of its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Sigil {
    witness: String,
    layer: Option<String>,
}

/// Error when a sigil string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid witness sigil: {0:?}")]
pub struct SigilParseError(pub String);

fn layered_sigil() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"^(?P<witness>[^()]*[^()\s]) \((?P<layer>[^()]+)\)$")
            .unwrap_or_else(|e| unreachable!("static sigil pattern: {e}"))
    })
}

/// A witness or layer name: non-empty, no surrounding whitespace, no parentheses.
fn valid_part(part: &str) -> bool {
    !part.is_empty() && part.trim() == part && !part.contains(['(', ')'])
}

impl Sigil {
    /// Build a sigil from its parts, rejecting names that would not
    /// display and parse back to the same sigil.
    pub fn try_new(witness: impl Into<String>, layer: Option<String>) -> Result<Self, SigilParseError> {
        let witness = witness.into();
        let sigil = Self { witness, layer };
        let layer_ok = sigil.layer.as_deref().map_or(true, valid_part);
        if !valid_part(&sigil.witness) || !layer_ok {
            return Err(SigilParseError(sigil.to_string()));
        }
        Ok(sigil)
    }

    /// Base witness sigil from a bare witness id.
    ///
    /// `witness` must already be a plain id; display forms such as `A (c)`
    /// panic in debug builds. Use `parse` or [`Sigil::try_new`] for text
    /// from outside the program.
    pub fn base(witness: impl Into<String>) -> Self {
        let witness = witness.into();
        debug_assert!(valid_part(&witness), "malformed witness id {witness:?}");
        Self { witness, layer: None }
    }

    /// Layered witness sigil from a bare witness id and layer name.
    pub fn layered(witness: impl Into<String>, layer: impl Into<String>) -> Self {
        let (witness, layer) = (witness.into(), layer.into());
        debug_assert!(
            valid_part(&witness) && valid_part(&layer),
            "malformed layered sigil {witness:?} / {layer:?}"
        );
        Self {
            witness,
            layer: Some(layer),
        }
    }

    /// Witness identifier without layer.
    pub fn witness(&self) -> &str {
        &self.witness
    }

    /// Layer name, if any.
    pub fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }

    /// True if this sigil names a layer.
    pub fn is_layer(&self) -> bool {
        self.layer.is_some()
    }

    /// The base witness this sigil belongs to.
    pub fn to_base(&self) -> Sigil {
        Sigil::base(self.witness.clone())
    }
}

impl fmt::Display for Sigil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{} ({})", self.witness, layer),
            None => write!(f, "{}", self.witness),
        }
    }
}

impl FromStr for Sigil {
    type Err = SigilParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SigilParseError(s.to_string()));
        }
        let parsed = match layered_sigil().captures(trimmed) {
            Some(caps) => {
                let witness = caps.name("witness").map(|m| m.as_str()).unwrap_or_default();
                let layer = caps.name("layer").map(|m| m.as_str().trim().to_string());
                Sigil::try_new(witness.trim(), layer)
            }
            None => Sigil::try_new(trimmed, None),
        };
        parsed.map_err(|_| SigilParseError(s.to_string()))
    }
}

impl From<Sigil> for String {
    fn from(sigil: Sigil) -> Self {
        sigil.to_string()
    }
}

impl TryFrom<String> for Sigil {
    type Error = SigilParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_and_layer() {
        assert_eq!("A".parse::<Sigil>().unwrap(), Sigil::base("A"));
        assert_eq!(
            "Vat. gr. 1 (a.c.)".parse::<Sigil>().unwrap(),
            Sigil::layered("Vat. gr. 1", "a.c.")
        );
    }

    #[test]
    fn test_display_round_trips() {
        for raw in ["A", "B (ac)", "Par. 12 (s.l.)"] {
            let sigil: Sigil = raw.parse().unwrap();
            assert_eq!(sigil.to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<Sigil>().is_err());
        assert!("A (".parse::<Sigil>().is_err());
        assert!("(ac)".parse::<Sigil>().is_err());
    }

    #[test]
    fn test_try_new_rejects_display_form() {
        assert_eq!(
            Sigil::try_new("A (c)", None).unwrap_err(),
            SigilParseError("A (c)".to_string())
        );
        assert!(Sigil::try_new("A", Some("(c)".into())).is_err());
        assert!(Sigil::try_new(" A", None).is_err());
        assert!(Sigil::try_new("A", Some(String::new())).is_err());
        assert_eq!(Sigil::try_new("A", Some("c".into())).unwrap(), Sigil::layered("A", "c"));
    }

    #[test]
    fn test_display_form_parses_to_layer() {
        let parsed: Sigil = "A (c)".parse().unwrap();
        assert!(parsed.is_layer());
        assert_eq!(parsed, Sigil::layered("A", "c"));
        assert_ne!(parsed.to_base(), parsed);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "malformed witness id")]
    fn test_base_rejects_display_form_in_debug() {
        let _ = Sigil::base("A (c)");
    }

    #[test]
    fn test_base_of_layer() {
        let layer = Sigil::layered("A", "ac");
        assert!(layer.is_layer());
        assert_eq!(layer.to_base(), Sigil::base("A"));
        assert!(!layer.to_base().is_layer());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Sigil::layered("A", "ac")).unwrap();
        assert_eq!(json, "\"A (ac)\"");
        let back: Sigil = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sigil::layered("A", "ac"));
    }
}
