//! Spoiler gating.
//!
//! [`should_hide`] is the pure decision for one piece of chapter-tagged
//! content.  [`SpoilerGate`] wraps a rendered item and re-runs that decision
//! on every render against the latest settings and progress.  The only state
//! it keeps is whether the reader clicked the placeholder; once clicked, the
//! instance stays revealed and nothing moves it back.

use crate::types::{SpoilerSettings, Spoilerable};

/// Whether content tagged `chapter` must be hidden from this reader.
pub fn should_hide(chapter: Option<u32>, settings: &SpoilerSettings, progress: u32) -> bool {
    if settings.show_all_spoilers {
        return false;
    }

    let effective_progress = settings.effective_progress(progress);

    match chapter {
        None => false,
        // reading chapter N makes content tagged N visible
        Some(chapter) => chapter > effective_progress,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Hidden,
    Revealed,
}

/// Click on a spoiler placeholder.
///
/// The gate consumes the click so an enclosing clickable card does not
/// navigate as well.
#[derive(Debug, Default)]
pub struct RevealClick {
    propagation_stopped: bool,
}

impl RevealClick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Overlay drawn on top of hidden content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub chapter: u32,
    pub chapter_title: Option<String>,
}

impl Placeholder {
    pub fn label(&self) -> String {
        match &self.chapter_title {
            Some(title) => format!(
                "Spoiler for chapter {}: {}. Click to reveal.",
                self.chapter, title
            ),
            None => format!("Spoiler for chapter {}. Click to reveal.", self.chapter),
        }
    }
}

/// What a gate renders on one pass.
///
/// `content` is always present, so hidden items keep their layout and
/// reveal without a refetch.  `overlay` is `Some` while the item is hidden.
#[derive(Debug)]
pub struct GateView<'a, C> {
    pub content: &'a C,
    pub overlay: Option<Placeholder>,
}

impl<C> GateView<'_, C> {
    pub fn is_hidden(&self) -> bool {
        self.overlay.is_some()
    }
}

/// One rendered instance of spoilerable content.
#[derive(Debug)]
pub struct SpoilerGate<C> {
    content: C,
    revealed_by_click: bool,
    chapter_title: Option<String>,
}

impl<C: Spoilerable> SpoilerGate<C> {
    pub fn new(content: C) -> Self {
        Self {
            content,
            revealed_by_click: false,
            chapter_title: None,
        }
    }

    /// Attach the chapter title shown on the placeholder.
    pub fn with_chapter_title(mut self, title: impl Into<String>) -> Self {
        self.chapter_title = Some(title.into());
        self
    }

    /// State under the given snapshot.
    pub fn state(&self, settings: &SpoilerSettings, progress: u32) -> GateState {
        if !self.revealed_by_click
            && should_hide(self.content.chapter_number(), settings, progress)
        {
            GateState::Hidden
        } else {
            GateState::Revealed
        }
    }

    /// The reader clicked this instance open.
    pub fn is_revealed_by_click(&self) -> bool {
        self.revealed_by_click
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    /// Render against the latest progress and settings.
    pub fn view(&self, settings: &SpoilerSettings, progress: u32) -> GateView<'_, C> {
        let overlay = match (self.state(settings, progress), self.content.chapter_number()) {
            (GateState::Hidden, Some(chapter)) => Some(Placeholder {
                chapter,
                chapter_title: self.chapter_title.clone(),
            }),
            _ => None,
        };

        GateView {
            content: &self.content,
            overlay,
        }
    }

    /// Handle a click on the placeholder. Returns `true` on the transition.
    pub fn reveal(&mut self, click: &mut RevealClick) -> bool {
        if self.revealed_by_click {
            return false;
        }

        click.stop_propagation();
        self.revealed_by_click = true;
        true
    }
}
