//! Expected behaviour of a keyboard-navigable suggestion list
//!
//! The model is independent of any concrete UI. The orchestrator drives it
//! with the same inputs it sends to the page and then checks that the live
//! DOM agrees with [`SelectionListModel::selected_flags`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// Keys the list reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKey {
    ArrowDown,
    ArrowUp,
    Enter,
}

impl ListKey {
    /// Map a key name as passed to the driver; other keys do not touch the list
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ArrowDown" => Some(ListKey::ArrowDown),
            "ArrowUp" => Some(ListKey::ArrowUp),
            "Enter" => Some(ListKey::Enter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub text: String,
    pub index: usize,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SelectionListState {
    Closed,
    Open {
        items: Vec<SuggestionItem>,
        highlight: Option<usize>,
    },
    Committed { value: String },
}

impl fmt::Display for SelectionListState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionListState::Closed => write!(f, "closed"),
            SelectionListState::Open { items, highlight: Some(i) } => {
                write!(f, "open({} items, highlight {})", items.len(), i)
            }
            SelectionListState::Open { items, highlight: None } => {
                write!(f, "open({} items, no highlight)", items.len())
            }
            SelectionListState::Committed { value } => write!(f, "committed(\"{}\")", value),
        }
    }
}

/// State machine for one suggestion list
#[derive(Debug, Clone)]
pub struct SelectionListModel {
    state: SelectionListState,
    min_query_len: usize,
    armed: bool,
}

impl SelectionListModel {
    pub fn new(min_query_len: usize) -> Self {
        Self {
            state: SelectionListState::Closed,
            min_query_len,
            armed: false,
        }
    }

    pub fn state(&self) -> &SelectionListState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = SelectionListState::Closed;
        self.armed = false;
    }

    /// The input changed; the list closes until new suggestions arrive.
    ///
    /// Only a query of at least `min_query_len` characters may reopen it.
    pub fn input_changed(&mut self, query: &str) {
        self.state = SelectionListState::Closed;
        self.armed = query.chars().count() >= self.min_query_len;
    }

    /// Suggestions were rendered for the last qualifying input
    pub fn open(&mut self, texts: Vec<String>) -> E2eResult<()> {
        if self.state != SelectionListState::Closed {
            return Err(E2eError::InvalidTransition(format!(
                "cannot open a list that is {}",
                self.state
            )));
        }
        if !self.armed {
            return Err(E2eError::InvalidTransition(
                "list opened without a qualifying input".into(),
            ));
        }

        let items = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| SuggestionItem { text, index, selected: false })
            .collect();
        self.state = SelectionListState::Open { items, highlight: None };
        self.armed = false;
        Ok(())
    }

    /// Apply a key press; returns whether the state changed
    pub fn press(&mut self, key: ListKey) -> bool {
        let SelectionListState::Open { items, highlight } = &mut self.state else {
            return false;
        };

        let next = match (key, *highlight) {
            (_, _) if items.is_empty() => return false,
            (ListKey::ArrowDown, None) => Some(0),
            (ListKey::ArrowDown, Some(i)) => Some((i + 1).min(items.len() - 1)),
            (ListKey::ArrowUp, None) => None,
            (ListKey::ArrowUp, Some(i)) => Some(i.saturating_sub(1)),
            (ListKey::Enter, None) => return false,
            (ListKey::Enter, Some(i)) => {
                let value = items.get(i).map(|item| item.text.clone()).unwrap_or_default();
                self.state = SelectionListState::Committed { value };
                return true;
            }
        };

        if next == *highlight {
            return false;
        }
        *highlight = next;
        for item in items.iter_mut() {
            item.selected = Some(item.index) == next;
        }
        true
    }

    /// Click on item `index`, committing it regardless of the highlight
    pub fn click(&mut self, index: usize) -> E2eResult<()> {
        let SelectionListState::Open { items, .. } = &self.state else {
            return Err(E2eError::InvalidTransition(format!(
                "cannot click an item while the list is {}",
                self.state
            )));
        };
        let item = items.get(index).ok_or_else(|| {
            E2eError::InvalidTransition(format!(
                "no item {} in a list of {}",
                index,
                items.len()
            ))
        })?;
        self.state = SelectionListState::Committed { value: item.text.clone() };
        Ok(())
    }

    /// Position of the item with this text, for clicks by name
    pub fn position(&self, text: &str) -> Option<usize> {
        match &self.state {
            SelectionListState::Open { items, .. } => items.iter().position(|i| i.text == text),
            _ => None,
        }
    }

    /// Expected selected flag per item while open
    pub fn selected_flags(&self) -> Option<Vec<bool>> {
        match &self.state {
            SelectionListState::Open { items, .. } => {
                Some(items.iter().map(|i| i.selected).collect())
            }
            _ => None,
        }
    }

    pub fn highlighted_text(&self) -> Option<&str> {
        match &self.state {
            SelectionListState::Open { items, highlight: Some(i) } => {
                items.get(*i).map(|item| item.text.as_str())
            }
            _ => None,
        }
    }

    pub fn committed_value(&self) -> Option<&str> {
        match &self.state {
            SelectionListState::Committed { value } => Some(value),
            _ => None,
        }
    }

    /// At most one item is selected, and it is exactly the highlighted one
    pub fn invariant_holds(&self) -> bool {
        match &self.state {
            SelectionListState::Open { items, highlight } => {
                let in_range = highlight.map_or(true, |i| i < items.len());
                let selected: Vec<usize> =
                    items.iter().filter(|i| i.selected).map(|i| i.index).collect();
                in_range
                    && match highlight {
                        Some(i) => selected == [*i],
                        None => selected.is_empty(),
                    }
            }
            _ => true,
        }
    }
}

impl Default for SelectionListModel {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn open_model() -> SelectionListModel {
        let mut model = SelectionListModel::default();
        model.input_changed("Sof");
        model
            .open(vec![
                "Software Engineer".into(),
                "Software Developer".into(),
                "Solution Architect".into(),
            ])
            .unwrap();
        model
    }

    fn highlight(model: &SelectionListModel) -> Option<usize> {
        match model.state() {
            SelectionListState::Open { highlight, .. } => *highlight,
            other => panic!("expected open list, got {}", other),
        }
    }

    #[test]
    fn test_open_requires_qualifying_input() {
        let mut model = SelectionListModel::default();
        assert!(model.open(vec!["x".into()]).is_err());

        model.input_changed("So");
        assert!(model.open(vec!["x".into()]).is_err());

        model.input_changed("Sof");
        model.open(vec!["x".into()]).unwrap();
        assert_eq!(highlight(&model), None);
        assert!(model.invariant_holds());

        // Opening again needs another input event.
        assert!(model.open(vec!["x".into()]).is_err());
    }

    #[test_case(&[ListKey::ArrowDown], Some(0) ; "first arrow highlights first item")]
    #[test_case(&[ListKey::ArrowDown, ListKey::ArrowDown], Some(1) ; "second arrow moves down")]
    #[test_case(&[ListKey::ArrowDown; 7], Some(2) ; "clamps at the last item")]
    #[test_case(&[ListKey::ArrowUp], None ; "arrow up without highlight is a no op")]
    #[test_case(&[ListKey::ArrowDown, ListKey::ArrowDown, ListKey::ArrowUp], Some(0) ; "arrow up moves back")]
    #[test_case(&[ListKey::ArrowDown, ListKey::ArrowUp, ListKey::ArrowUp], Some(0) ; "clamps at the first item")]
    fn test_navigation(keys: &[ListKey], expected: Option<usize>) {
        let mut model = open_model();
        for key in keys {
            model.press(*key);
            assert!(model.invariant_holds());
        }
        assert_eq!(highlight(&model), expected);
    }

    #[test]
    fn test_selected_flags_follow_highlight() {
        let mut model = open_model();
        assert_eq!(model.selected_flags(), Some(vec![false, false, false]));

        model.press(ListKey::ArrowDown);
        assert_eq!(model.selected_flags(), Some(vec![true, false, false]));
        assert_eq!(model.highlighted_text(), Some("Software Engineer"));

        model.press(ListKey::ArrowDown);
        assert_eq!(model.selected_flags(), Some(vec![false, true, false]));
    }

    #[test]
    fn test_enter_commits_highlighted_item() {
        let mut model = open_model();
        model.press(ListKey::ArrowDown);
        assert!(model.press(ListKey::Enter));
        assert_eq!(
            model.state(),
            &SelectionListState::Committed { value: "Software Engineer".into() }
        );
        assert_eq!(model.committed_value(), Some("Software Engineer"));
    }

    #[test]
    fn test_enter_without_highlight_is_a_no_op() {
        let mut model = open_model();
        let before = model.state().clone();
        assert!(!model.press(ListKey::Enter));
        assert_eq!(model.state(), &before);
    }

    #[test]
    fn test_click_commits_regardless_of_highlight() {
        let mut model = open_model();
        model.press(ListKey::ArrowDown);
        model.click(2).unwrap();
        assert_eq!(model.committed_value(), Some("Solution Architect"));

        let mut model = open_model();
        assert!(model.click(3).is_err());
    }

    #[test]
    fn test_keys_on_closed_or_committed_list_are_ignored() {
        let mut model = SelectionListModel::default();
        assert!(!model.press(ListKey::ArrowDown));
        assert_eq!(model.state(), &SelectionListState::Closed);

        let mut model = open_model();
        model.press(ListKey::ArrowDown);
        model.press(ListKey::Enter);
        assert!(!model.press(ListKey::ArrowDown));
        assert!(model.click(0).is_err());
    }

    #[test]
    fn test_empty_list_never_highlights() {
        let mut model = SelectionListModel::default();
        model.input_changed("Xyz");
        model.open(vec![]).unwrap();
        assert!(!model.press(ListKey::ArrowDown));
        assert!(!model.press(ListKey::Enter));
        assert!(model.invariant_holds());
    }

    #[test]
    fn test_input_after_commit_closes_list() {
        let mut model = open_model();
        model.click(0).unwrap();
        model.input_changed("Software Engineer II");
        assert_eq!(model.state(), &SelectionListState::Closed);
        model.open(vec!["Software Engineer III".into()]).unwrap();
        assert_eq!(model.position("Software Engineer III"), Some(0));
    }

    #[test]
    fn test_key_names() {
        assert_eq!(ListKey::from_name("ArrowDown"), Some(ListKey::ArrowDown));
        assert_eq!(ListKey::from_name("Enter"), Some(ListKey::Enter));
        assert_eq!(ListKey::from_name("Tab"), None);
    }
}
