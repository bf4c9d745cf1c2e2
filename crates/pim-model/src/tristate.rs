/// A three-valued override: `Undefined` defers to whatever the enclosing
/// scope decides (e.g. a collection's `enabled` flag), `True`/`False` pin
/// the value regardless of that default. Used by per-view preferences
/// (§3 Collection: display/sync/index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tristate {
    True,
    False,
    #[default]
    Undefined,
}

impl Tristate {
    /// Resolve against a fallback that applies when the value is `Undefined`.
    pub fn resolve(self, fallback: bool) -> bool {
        match self {
            Tristate::True => true,
            Tristate::False => false,
            Tristate::Undefined => fallback,
        }
    }
}
