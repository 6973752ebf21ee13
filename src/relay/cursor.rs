/// Acknowledgement boundary for consumed source updates.
///
/// Lives only in memory; a restart starts from whatever the source still
/// holds as unacknowledged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCursor {
    last_seen_id: Option<i64>,
}

impl UpdateCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen_id(&self) -> Option<i64> {
        self.last_seen_id
    }

    /// Offset for the next fetch: strictly past everything seen so far
    pub fn next_offset(&self) -> Option<i64> {
        self.last_seen_id.map(|id| id + 1)
    }

    /// Record `update_id` as consumed. Never moves backwards.
    pub fn advance(&mut self, update_id: i64) {
        self.last_seen_id = Some(match self.last_seen_id {
            Some(current) => current.max(update_id),
            None => update_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cursor_has_no_offset() {
        let cursor = UpdateCursor::new();
        assert_eq!(cursor.last_seen_id(), None);
        assert_eq!(cursor.next_offset(), None);
    }

    #[test]
    fn test_advance_sets_next_offset() {
        let mut cursor = UpdateCursor::new();
        cursor.advance(41);
        assert_eq!(cursor.last_seen_id(), Some(41));
        assert_eq!(cursor.next_offset(), Some(42));
    }

    #[test]
    fn test_never_moves_backwards() {
        let mut cursor = UpdateCursor::new();
        for id in [5, 9, 7, 9, 3] {
            cursor.advance(id);
        }
        assert_eq!(cursor.last_seen_id(), Some(9));
    }
}
