use thiserror::Error;

use crate::types::LobbySummary;

/// Errors that can occur while addressing the directory snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// An index referenced a lobby that is not in the current snapshot.
    #[error("lobby index {index} out of range (snapshot holds {len})")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Current snapshot length.
        len: usize,
    },
}

/// Last fetched snapshot of candidate lobbies plus the user's selection.
///
/// The snapshot is replaced wholesale on every refresh; replacing it
/// invalidates any rows rendered from the previous snapshot, so consumers
/// re-render from the `DirectoryUpdated` event.
#[derive(Debug, Clone, Default)]
pub struct LobbyDirectory {
    lobbies: Vec<LobbySummary>,
    selected: Option<usize>,
}

impl LobbyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot in backend order.
    pub fn lobbies(&self) -> &[LobbySummary] {
        &self.lobbies
    }

    /// Number of lobbies in the current snapshot.
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Lobby at `index` in the current snapshot, when present.
    pub fn get(&self, index: usize) -> Option<&LobbySummary> {
        self.lobbies.get(index)
    }

    /// Currently selected index, when one is set.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Currently selected lobby, when one is set.
    pub fn selected_lobby(&self) -> Option<&LobbySummary> {
        self.selected.and_then(|index| self.lobbies.get(index))
    }

    /// Replace the visible snapshot.
    ///
    /// Always resets the selection; a selection only ever refers to the
    /// snapshot it was made against.
    pub fn replace(&mut self, lobbies: Vec<LobbySummary>) {
        self.lobbies = lobbies;
        self.selected = None;
    }

    /// Drop the snapshot and the selection.
    pub fn clear(&mut self) {
        self.lobbies.clear();
        self.selected = None;
    }

    /// Reset the selection to "none selected" while keeping the snapshot.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Record the user's pick and return the selected lobby.
    pub fn select(&mut self, index: usize) -> Result<&LobbySummary, DirectoryError> {
        if index >= self.lobbies.len() {
            return Err(DirectoryError::OutOfRange {
                index,
                len: self.lobbies.len(),
            });
        }
        self.selected = Some(index);
        Ok(&self.lobbies[index])
    }

    /// Render the key/value pairs of the lobby at `index` as a display line,
    /// concatenating `"key:value, "` for each pair in fetch order.
    pub fn metadata_line(&self, index: usize) -> Result<String, DirectoryError> {
        let lobby = self.get(index).ok_or(DirectoryError::OutOfRange {
            index,
            len: self.lobbies.len(),
        })?;

        let mut line = String::new();
        for (key, value) in &lobby.metadata {
            line.push_str(key);
            line.push(':');
            line.push_str(value);
            line.push_str(", ");
        }
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    fn summary(id: u64, metadata: &[(&str, &str)]) -> LobbySummary {
        LobbySummary {
            id: SessionId(id),
            member_count: 1,
            member_limit: 4,
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn replace_resets_selection() {
        let mut directory = LobbyDirectory::new();
        directory.replace(vec![summary(1, &[]), summary(2, &[])]);
        directory.select(1).expect("select should work");
        assert_eq!(directory.selected(), Some(1));

        directory.replace(vec![summary(3, &[])]);
        assert_eq!(directory.selected(), None);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn rejects_selection_out_of_range() {
        let mut directory = LobbyDirectory::new();
        directory.replace(vec![summary(1, &[])]);

        let err = directory.select(1).expect_err("selection must be in range");
        assert_eq!(err, DirectoryError::OutOfRange { index: 1, len: 1 });
        assert_eq!(directory.selected(), None);
    }

    #[test]
    fn renders_metadata_pairs_in_fetch_order() {
        let mut directory = LobbyDirectory::new();
        directory.replace(vec![summary(7, &[("map", "dust"), ("region", "eu")])]);

        let line = directory.metadata_line(0).expect("index is in range");
        assert_eq!(line, "map:dust, region:eu, ");
    }

    #[test]
    fn renders_empty_line_for_lobby_without_metadata() {
        let mut directory = LobbyDirectory::new();
        directory.replace(vec![summary(7, &[])]);

        assert_eq!(directory.metadata_line(0).expect("in range"), "");
    }

    #[test]
    fn clear_drops_snapshot_and_selection() {
        let mut directory = LobbyDirectory::new();
        directory.replace(vec![summary(1, &[])]);
        directory.select(0).expect("select should work");

        directory.clear();
        assert!(directory.is_empty());
        assert_eq!(directory.selected(), None);
        assert_eq!(directory.selected_lobby(), None);
    }
}
