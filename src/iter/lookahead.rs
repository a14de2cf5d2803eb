/// One row fetched from an iterator but not yet consumed, kept across
/// calls. Storage is reused from row to row.
pub struct Lookahead<R> {
    slot: Option<R>,
    full: bool,
}

impl<R> Lookahead<R> {
    pub fn new() -> Self {
        Self {
            slot: None,
            full: false,
        }
    }

    pub fn get(&self) -> Option<&R> {
        if self.full {
            self.slot.as_ref()
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn clear(&mut self) {
        self.full = false;
    }
}

impl<R: Clone> Lookahead<R> {
    pub fn fill(&mut self, row: &R) {
        match &mut self.slot {
            Some(slot) => slot.clone_from(row),
            None => self.slot = Some(row.clone()),
        }
        self.full = true;
    }
}

impl<R> Default for Lookahead<R> {
    fn default() -> Self {
        Self::new()
    }
}
