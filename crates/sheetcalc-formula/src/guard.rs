//! Cycle detection for on-demand evaluation

use crate::error::{FormulaError, FormulaResult};
use ahash::AHashSet;
use sheetcalc_core::CellKey;

/// Cells of a cycle listed in its error message
const MAX_CHAIN_SHOWN: usize = 8;

/// Set of cells whose evaluation is in flight
///
/// A cell is entered before its formula is evaluated and left when the
/// evaluation finishes, whether it succeeded or not. Entering a cell that is
/// already in flight means the formula depends on its own value.
#[derive(Debug, Default)]
pub struct TraversalGuard {
    in_flight: AHashSet<CellKey>,
    /// Entry order, for reporting the chain that closed a cycle
    stack: Vec<CellKey>,
}

impl TraversalGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a cell as in flight
    ///
    /// Fails with [`FormulaError::CircularReference`] when the cell is
    /// already in flight; the guard is left unchanged in that case.
    pub fn enter(&mut self, key: &CellKey) -> FormulaResult<()> {
        self.check(key)?;
        self.in_flight.insert(key.clone());
        self.stack.push(key.clone());
        Ok(())
    }

    /// Fail with [`FormulaError::CircularReference`] if reading `key` now
    /// would close a cycle
    pub fn check(&self, key: &CellKey) -> FormulaResult<()> {
        if self.in_flight.contains(key) {
            return Err(FormulaError::CircularReference(self.cycle_from(key)));
        }
        Ok(())
    }

    /// Mark a cell as finished
    pub fn leave(&mut self, key: &CellKey) {
        if self.in_flight.remove(key) {
            if let Some(pos) = self.stack.iter().rposition(|k| k == key) {
                self.stack.remove(pos);
            }
        }
    }

    /// Whether a cell is in flight
    pub fn contains(&self, key: &CellKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Most recently entered cell
    pub fn current(&self) -> Option<&CellKey> {
        self.stack.last()
    }

    /// Number of cells in flight
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// `A1 -> B1 -> A1` for a key that is already on the stack
    ///
    /// Long chains keep their ends: `A1 -> A2 -> A3 -> ... (n more) -> A9 -> A1`.
    fn cycle_from(&self, key: &CellKey) -> String {
        let start = self.stack.iter().position(|k| k == key).unwrap_or(0);
        let cycle = &self.stack[start..];

        let mut chain: Vec<String> = if cycle.len() > MAX_CHAIN_SHOWN {
            let head = MAX_CHAIN_SHOWN / 2;
            let tail = MAX_CHAIN_SHOWN - head;
            cycle[..head]
                .iter()
                .map(ToString::to_string)
                .chain(std::iter::once(format!("... ({} more)", cycle.len() - MAX_CHAIN_SHOWN)))
                .chain(cycle[cycle.len() - tail..].iter().map(ToString::to_string))
                .collect()
        } else {
            cycle.iter().map(ToString::to_string).collect()
        };
        chain.push(key.to_string());
        chain.join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcalc_core::CellAddress;

    fn key(addr: &str) -> CellKey {
        CellKey::new("S", CellAddress::parse(addr).unwrap())
    }

    #[test]
    fn test_enter_and_leave() {
        let mut guard = TraversalGuard::new();
        guard.enter(&key("A1")).unwrap();
        guard.enter(&key("B1")).unwrap();
        assert_eq!(guard.depth(), 2);
        assert_eq!(guard.current(), Some(&key("B1")));

        guard.leave(&key("B1"));
        guard.leave(&key("A1"));
        assert!(guard.is_empty());

        // Re-entering after leaving is fine
        guard.enter(&key("A1")).unwrap();
    }

    #[test]
    fn test_reentry_is_circular() {
        let mut guard = TraversalGuard::new();
        guard.enter(&key("A1")).unwrap();
        guard.enter(&key("B1")).unwrap();

        assert!(guard.check(&key("C1")).is_ok());
        assert_eq!(guard.check(&key("B1")), guard.enter(&key("B1")));

        let err = guard.enter(&key("A1")).unwrap_err();
        assert_eq!(
            err,
            FormulaError::CircularReference("S!A1 -> S!B1 -> S!A1".into())
        );
        assert_eq!(guard.depth(), 2);
    }

    #[test]
    fn test_long_cycle_message_keeps_the_ends() {
        let mut guard = TraversalGuard::new();
        for row in 1..=20 {
            guard.enter(&key(&format!("A{}", row))).unwrap();
        }

        let err = guard.enter(&key("A1")).unwrap_err();
        assert_eq!(
            err,
            FormulaError::CircularReference(
                "S!A1 -> S!A2 -> S!A3 -> S!A4 -> ... (12 more) -> S!A17 -> S!A18 -> S!A19 -> S!A20 -> S!A1"
                    .into()
            )
        );
    }

    #[test]
    fn test_leave_unknown_key_is_noop() {
        let mut guard = TraversalGuard::new();
        guard.enter(&key("A1")).unwrap();
        guard.leave(&key("Z9"));
        assert!(guard.contains(&key("A1")));
    }
}
