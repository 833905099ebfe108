//! Fixed-capacity solution state for one problem.

/// Ordered slots holding committed actions.
///
/// Slots fill strictly left to right; a filled slot is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionState {
    slots: Vec<Option<String>>,
}

impl SolutionState {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.slots.iter().take_while(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Write `action` into the first empty slot.
    ///
    /// Returns the slot index, or `None` when the solution is already full.
    pub fn commit(&mut self, action: String) -> Option<usize> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(action);
        Some(index)
    }

    /// Committed actions in order.
    pub fn committed(&self) -> Vec<&str> {
        self.slots.iter().flatten().map(String::as_str).collect()
    }

    /// Concatenation of every committed action.
    pub fn render(&self) -> String {
        self.slots.iter().flatten().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_fill_first_empty_slot_until_full() {
        let mut solution = SolutionState::new(2);
        assert!(solution.is_empty());
        assert_eq!(solution.commit("a.".to_string()), Some(0));
        assert_eq!(solution.commit(" b.".to_string()), Some(1));
        assert!(solution.is_full());
        assert_eq!(solution.commit(" c.".to_string()), None);
        assert_eq!(solution.committed(), vec!["a.", " b."]);
        assert_eq!(solution.render(), "a. b.");
        assert_eq!(solution.len(), 2);
    }

    #[test]
    fn zero_capacity_is_full_from_the_start() {
        let solution = SolutionState::new(0);
        assert!(solution.is_full());
        assert_eq!(solution.render(), "");
    }
}
