use std::path::Path;

use crate::lines::LineStore;
use crate::model::{LinkRef, Message, ModLink, ModelBuilder, Track, WireAssignment, link_index};
use crate::scan;

/// A parsed project: the verbatim line store plus the entity tree built
/// over it. The two are kept consistent — every mutation rewrites exactly
/// one line and updates the matching in-memory link.
pub struct Project {
    store: LineStore,
    tracks: Vec<Track>,
}

impl Project {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let store = LineStore::from_path(path)?;
        let project = Self::from_store(store);
        log::info!(
            "parsed {}: {} tracks, {} links",
            path.display(),
            project.tracks.len(),
            project.link_refs().len()
        );
        Ok(project)
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_store(LineStore::from_text(text))
    }

    fn from_store(store: LineStore) -> Self {
        let mut builder = ModelBuilder::new();
        for ev in scan::scan(&store) {
            builder.push_event(&ev);
        }
        Project {
            tracks: builder.finish(),
            store,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Flat addresses of every modulation link, in tree order.
    pub fn link_refs(&self) -> Vec<LinkRef> {
        link_index(&self.tracks)
    }

    pub fn link(&self, r: LinkRef) -> Option<&ModLink> {
        self.tracks
            .get(r.track)?
            .fx
            .get(r.fx)?
            .links
            .get(r.link)
    }

    fn link_mut(&mut self, r: LinkRef) -> Option<&mut ModLink> {
        self.tracks
            .get_mut(r.track)?
            .fx
            .get_mut(r.fx)?
            .links
            .get_mut(r.link)
    }

    /// Rewrite one link's MIDIPLINK line in place as a controller
    /// assignment, preserving the line's leading indentation and
    /// terminator, and update the in-memory link to match.
    ///
    /// Fails without touching anything if the address does not resolve or
    /// the link has no MIDIPLINK line to rewrite; a new line is never
    /// fabricated.
    pub fn set_wire(
        &mut self,
        r: LinkRef,
        bus: u32,
        channel: u32,
        controller: u32,
    ) -> anyhow::Result<()> {
        let Some(link) = self.link(r) else {
            anyhow::bail!("no modulation link at {r}");
        };
        let Some(anchor) = link.wire.as_ref().map(|w| w.line) else {
            anyhow::bail!("link {r} ({}) has no MIDIPLINK line to rewrite", link.param_name);
        };
        let old = self
            .store
            .content(anchor)
            .ok_or_else(|| anyhow::anyhow!("link {r} anchored to missing line {anchor}"))?;
        let indent = &old[..old.len() - old.trim_start().len()];
        let new = format!(
            "{indent}MIDIPLINK {bus} {channel} {} {controller}",
            Message::CONTROLLER_KIND
        );
        self.store.replace_content(anchor, &new)?;
        // store first, then the cached fields; never leave the two apart
        if let Some(link) = self.link_mut(r) {
            link.wire = Some(WireAssignment {
                line: anchor,
                bus,
                channel,
                message: Message::Controller(controller),
            });
        }
        log::debug!("line {anchor}: {r} rewired to bus {bus} ch {channel} cc {controller}");
        Ok(())
    }

    /// Whether any line has been rewritten since parse.
    pub fn modified(&self) -> bool {
        self.store.modified()
    }

    /// Line content without terminator, for presentation.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.store.content(index)
    }

    /// The whole file as it would be saved.
    pub fn text(&self) -> String {
        self.store.text()
    }

    /// Write the line store verbatim to a path.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.store.save(path)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}
