//! Foreign toplevel tracking.
//!
//! Toplevels are application windows the compositor exposes for capture.
//! They are addressed by the opaque identifier the compositor assigns.

use serde::{Deserialize, Serialize};

/// Handle assigned by the enumeration collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToplevelId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToplevelEvent {
    Identifier(String),
    Title(String),
    AppId(String),
    Done,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToplevelInfo {
    pub id: ToplevelId,
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub app_id: Option<String>,
    pub closed: bool,
}

impl ToplevelInfo {
    fn new(id: ToplevelId) -> Self {
        Self {
            id,
            identifier: None,
            title: None,
            app_id: None,
            closed: false,
        }
    }
}

/// Known toplevels in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ToplevelList {
    toplevels: Vec<ToplevelInfo>,
}

impl ToplevelList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, id: ToplevelId, event: ToplevelEvent) {
        let index = match self.toplevels.iter().position(|t| t.id == id) {
            Some(index) => index,
            None => {
                self.toplevels.push(ToplevelInfo::new(id));
                self.toplevels.len() - 1
            }
        };
        let info = &mut self.toplevels[index];
        match event {
            ToplevelEvent::Identifier(identifier) => info.identifier = Some(identifier),
            ToplevelEvent::Title(title) => info.title = Some(title),
            ToplevelEvent::AppId(app_id) => info.app_id = Some(app_id),
            ToplevelEvent::Closed => info.closed = true,
            ToplevelEvent::Done => {}
        }
    }

    pub fn toplevels(&self) -> &[ToplevelInfo] {
        &self.toplevels
    }

    /// Find an open toplevel by its compositor-assigned identifier.
    pub fn find(&self, identifier: &str) -> Option<&ToplevelInfo> {
        self.toplevels
            .iter()
            .find(|t| !t.closed && t.identifier.as_deref() == Some(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_toplevel_by_identifier() {
        let mut list = ToplevelList::new();
        list.apply(ToplevelId(1), ToplevelEvent::Identifier("a1b2".into()));
        list.apply(ToplevelId(1), ToplevelEvent::Title("Terminal".into()));
        list.apply(ToplevelId(2), ToplevelEvent::Identifier("c3d4".into()));
        list.apply(ToplevelId(2), ToplevelEvent::AppId("org.example.Editor".into()));

        let found = list.find("c3d4").unwrap();
        assert_eq!(found.id, ToplevelId(2));
        assert_eq!(found.app_id.as_deref(), Some("org.example.Editor"));
        assert!(list.find("zzzz").is_none());
    }

    #[test]
    fn closed_toplevels_are_not_found() {
        let mut list = ToplevelList::new();
        list.apply(ToplevelId(5), ToplevelEvent::Identifier("gone".into()));
        list.apply(ToplevelId(5), ToplevelEvent::Closed);
        assert!(list.find("gone").is_none());
        assert_eq!(list.toplevels().len(), 1);
    }
}
