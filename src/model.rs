use std::fmt;
use std::str::FromStr;

use crate::scan::{FxKind, LineEvent, ScanEvent};

/// A track chunk: GUID, optional display name, FX in chain order.
pub struct Track {
    pub guid: Option<String>,
    pub name: Option<String>,
    pub fx: Vec<Fx>,
    /// Line index of the `<TRACK` declaration.
    pub line: usize,
}

/// One FX in a track's chain, with its parameter modulation links.
pub struct Fx {
    pub kind: FxKind,
    pub name: String,
    pub links: Vec<ModLink>,
    /// Line index of the FX declaration.
    pub line: usize,
}

/// A parameter modulation envelope and its optional MIDI wire assignment.
pub struct ModLink {
    pub param_id: String,
    pub param_name: String,
    pub bypassed: bool,
    pub wire: Option<WireAssignment>,
    /// Line index of the `<PROGRAMENV` declaration.
    pub line: usize,
}

/// The bus/channel/message quadruple from a `MIDIPLINK` line, anchored to
/// the line that carries it. The anchor is what makes in-place rewriting
/// possible: a link without a `WireAssignment` has no line to rewrite.
pub struct WireAssignment {
    /// Line index of the `MIDIPLINK` line.
    pub line: usize,
    pub bus: u32,
    pub channel: u32,
    pub message: Message,
}

/// MIDI message kind driving a link. Only controller (176) and note (144)
/// messages are classified; anything else keeps its raw kind tag and no
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Controller(u32),
    Note(u32),
    Other(u32),
}

impl Message {
    pub const CONTROLLER_KIND: u32 = 176;
    pub const NOTE_KIND: u32 = 144;

    pub fn from_wire(kind: u32, value: u32) -> Message {
        match kind {
            Self::CONTROLLER_KIND => Message::Controller(value),
            Self::NOTE_KIND => Message::Note(value),
            other => Message::Other(other),
        }
    }

    pub fn kind(&self) -> u32 {
        match *self {
            Message::Controller(_) => Self::CONTROLLER_KIND,
            Message::Note(_) => Self::NOTE_KIND,
            Message::Other(kind) => kind,
        }
    }

    /// Controller or note number, if the kind carries one.
    pub fn value(&self) -> Option<u32> {
        match *self {
            Message::Controller(v) | Message::Note(v) => Some(v),
            Message::Other(_) => None,
        }
    }
}

/// Flat (track, fx, link) address of a modulation link. This is the
/// addressing scheme the presentation layer and batch engine use; indices
/// are positions in the parsed tree and stay valid across mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRef {
    pub track: usize,
    pub fx: usize,
    pub link: usize,
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.track, self.fx, self.link)
    }
}

impl FromStr for LinkRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [track, fx, link] = parts.as_slice() else {
            return Err(format!("expected TRACK/FX/LINK, got '{s}'"));
        };
        let parse = |p: &str| {
            p.parse::<usize>()
                .map_err(|_| format!("'{p}' is not an index in '{s}'"))
        };
        Ok(LinkRef {
            track: parse(track)?,
            fx: parse(fx)?,
            link: parse(link)?,
        })
    }
}

/// Flat index of every link in the model, in tree order.
pub fn link_index(tracks: &[Track]) -> Vec<LinkRef> {
    let mut refs = Vec::new();
    for (ti, track) in tracks.iter().enumerate() {
        for (fi, fx) in track.fx.iter().enumerate() {
            for li in 0..fx.links.len() {
                refs.push(LinkRef {
                    track: ti,
                    fx: fi,
                    link: li,
                });
            }
        }
    }
    refs
}

/// One open scope. The stack is bounded and ordered: at most
/// `[Track, Chain, Fx, Env]`, and each tag closes by its own rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Never closed by `>`; replaced wholesale by the next `<TRACK`.
    Track { index: usize },
    /// Closed by a lone `>` at depth <= its recorded depth.
    Chain { depth: usize },
    /// Never closed by `>`: the FX stays current until the next FX opens or
    /// the chain closes. Its own block's `>` lines pass through harmlessly.
    Fx { index: usize },
    /// Closed eagerly by any lone `>`, regardless of depth. `None` marks an
    /// envelope with no FX to attach to: it still absorbs a MIDIPLINK and
    /// the eager close, but contributes nothing to the model.
    Env { link: Option<(usize, usize)> },
}

/// Folds the scanner's event stream into the track tree.
///
/// The asymmetric closing rules (chain by depth comparison, envelope
/// eagerly) are load-bearing: FX blocks contain nested sub-chunks whose `>`
/// lines must not end the chain, while a `>` after a MIDIPLINK must end the
/// envelope even though its depth was never recorded.
pub struct ModelBuilder {
    tracks: Vec<Track>,
    scopes: Vec<Scope>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        ModelBuilder {
            tracks: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn push_event(&mut self, ev: &ScanEvent) {
        match &ev.event {
            LineEvent::TrackOpen { guid } => self.open_track(guid.clone(), ev.line),
            LineEvent::TrackName { name } => self.set_track_name(name),
            LineEvent::ChainOpen => self.open_chain(ev.depth),
            LineEvent::FxOpen { kind, name } => self.open_fx(*kind, name.clone(), ev.line),
            LineEvent::EnvOpen {
                param_id,
                bypass,
                param_name,
            } => self.open_env(param_id.clone(), *bypass, param_name.clone(), ev.line),
            LineEvent::Wire {
                bus,
                channel,
                kind,
                value,
            } => self.set_wire(*bus, *channel, *kind, *value, ev.line),
            LineEvent::BlockClose => self.close(ev.depth),
            LineEvent::Other => {}
        }
    }

    pub fn finish(self) -> Vec<Track> {
        self.tracks
    }

    fn open_track(&mut self, guid: Option<String>, line: usize) {
        self.tracks.push(Track {
            guid,
            name: None,
            fx: Vec::new(),
            line,
        });
        self.scopes.clear();
        self.scopes.push(Scope::Track {
            index: self.tracks.len() - 1,
        });
    }

    fn set_track_name(&mut self, name: &str) {
        let Some(track) = self.current_track_mut() else {
            return;
        };
        track.name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
    }

    fn open_chain(&mut self, depth: usize) {
        if self.track_index().is_none() {
            return;
        }
        self.truncate_to_track();
        self.scopes.push(Scope::Chain { depth });
    }

    fn open_fx(&mut self, kind: FxKind, name: String, line: usize) {
        if self.chain_depth().is_none() {
            return;
        }
        // an fx boundary forcibly ends any open envelope, close marker or not
        self.pop_env();
        self.pop_fx();
        let Some(ti) = self.track_index() else {
            return;
        };
        let track = &mut self.tracks[ti];
        track.fx.push(Fx {
            kind,
            name,
            links: Vec::new(),
            line,
        });
        self.scopes.push(Scope::Fx {
            index: track.fx.len() - 1,
        });
    }

    fn open_env(&mut self, param_id: String, bypass: u32, param_name: String, line: usize) {
        if self.chain_depth().is_none() {
            return;
        }
        self.pop_env();
        let Some(ti) = self.track_index() else {
            return;
        };
        // attach to the open fx, falling back to the track's most recently
        // pushed fx: an envelope seen between fx blocks lands on the
        // previous one
        let fx_index = self
            .fx_index()
            .or_else(|| self.tracks[ti].fx.len().checked_sub(1));
        let link = fx_index.map(|fi| {
            let links = &mut self.tracks[ti].fx[fi].links;
            links.push(ModLink {
                param_id,
                param_name,
                bypassed: bypass != 0,
                wire: None,
                line,
            });
            (fi, links.len() - 1)
        });
        if link.is_none() {
            log::debug!("line {line}: modulation envelope has no fx to attach to, dropped");
        }
        self.scopes.push(Scope::Env { link });
    }

    fn set_wire(&mut self, bus: u32, channel: u32, kind: u32, value: u32, line: usize) {
        let Some(Scope::Env {
            link: Some((fi, li)),
        }) = self.scopes.last().copied()
        else {
            return;
        };
        let Some(ti) = self.track_index() else {
            return;
        };
        self.tracks[ti].fx[fi].links[li].wire = Some(WireAssignment {
            line,
            bus,
            channel,
            message: Message::from_wire(kind, value),
        });
    }

    fn close(&mut self, depth: usize) {
        // envelopes close on any lone '>', regardless of depth
        self.pop_env();
        // the chain closes only when the '>' sits at or left of its indent
        if let Some(d) = self.chain_depth() {
            if depth <= d {
                self.truncate_to_track();
            }
        }
    }

    fn track_index(&self) -> Option<usize> {
        self.scopes.iter().find_map(|s| match s {
            Scope::Track { index } => Some(*index),
            _ => None,
        })
    }

    fn chain_depth(&self) -> Option<usize> {
        self.scopes.iter().find_map(|s| match s {
            Scope::Chain { depth } => Some(*depth),
            _ => None,
        })
    }

    fn fx_index(&self) -> Option<usize> {
        self.scopes.iter().find_map(|s| match s {
            Scope::Fx { index } => Some(*index),
            _ => None,
        })
    }

    fn current_track_mut(&mut self) -> Option<&mut Track> {
        self.track_index().map(move |i| &mut self.tracks[i])
    }

    fn pop_env(&mut self) {
        if matches!(self.scopes.last(), Some(Scope::Env { .. })) {
            self.scopes.pop();
        }
    }

    fn pop_fx(&mut self) {
        if matches!(self.scopes.last(), Some(Scope::Fx { .. })) {
            self.scopes.pop();
        }
    }

    fn truncate_to_track(&mut self) {
        while !matches!(self.scopes.last(), None | Some(Scope::Track { .. })) {
            self.scopes.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LineStore;
    use crate::scan;

    fn build(text: &str) -> Vec<Track> {
        let store = LineStore::from_text(text);
        let mut builder = ModelBuilder::new();
        for ev in scan::scan(&store) {
            builder.push_event(&ev);
        }
        builder.finish()
    }

    #[test]
    fn single_track_single_fx_single_link() {
        let tracks = build(concat!(
            "<REAPER_PROJECT 0.1\n",
            "  <TRACK {AAAA-BBBB}\n",
            "    NAME \"Lead\"\n",
            "    <FXCHAIN\n",
            "      <VST \"VSTi: Serum\" Serum.so 0\n",
            "        blobdata==\n",
            "      >\n",
            "      <PROGRAMENV 5 0 \"Cutoff\"\n",
            "        MIDIPLINK 0 1 176 74\n",
            "      >\n",
            "    >\n",
            "  >\n",
            ">\n",
        ));
        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track.guid.as_deref(), Some("AAAA-BBBB"));
        assert_eq!(track.name.as_deref(), Some("Lead"));
        assert_eq!(track.line, 1);
        assert_eq!(track.fx.len(), 1);
        let fx = &track.fx[0];
        assert_eq!(fx.kind, FxKind::Vst);
        assert_eq!(fx.name, "VSTi: Serum");
        assert_eq!(fx.links.len(), 1);
        let link = &fx.links[0];
        assert_eq!(link.param_id, "5");
        assert_eq!(link.param_name, "Cutoff");
        assert!(!link.bypassed);
        assert_eq!(link.line, 7);
        let wire = link.wire.as_ref().unwrap();
        assert_eq!(wire.line, 8);
        assert_eq!((wire.bus, wire.channel), (0, 1));
        assert_eq!(wire.message, Message::Controller(74));
    }

    #[test]
    fn fx_boundary_closes_open_envelope() {
        // the second fx opens before the first envelope's '>' arrives; the
        // MIDIPLINK after it must not land on the dangling envelope
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"One\" one.so\n",
            "    >\n",
            "    <PROGRAMENV 0 0 \"Drive\"\n",
            "    <VST \"Two\" two.so\n",
            "    >\n",
            "      MIDIPLINK 0 1 176 11\n",
            "  >\n",
        ));
        let fx = &tracks[0].fx;
        assert_eq!(fx.len(), 2);
        assert_eq!(fx[0].links.len(), 1);
        assert!(fx[0].links[0].wire.is_none());
        assert!(fx[1].links.is_empty());
    }

    #[test]
    fn dangling_envelope_attaches_to_most_recent_fx() {
        // a nested <FXCHAIN resets the fx cursor, so the envelope has no
        // open fx and falls back to the last one pushed on the track
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"Synth\" s.so\n",
            "    >\n",
            "    <FXCHAIN\n",
            "      <PROGRAMENV 0 0 \"Cutoff\"\n",
            "        MIDIPLINK 0 1 176 74\n",
            "      >\n",
        ));
        assert_eq!(tracks[0].fx.len(), 1);
        let links = &tracks[0].fx[0].links;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].wire.as_ref().unwrap().message, Message::Controller(74));
    }

    #[test]
    fn orphan_envelope_is_dropped_but_scope_recovers() {
        // envelope before any fx: unrepresentable, silently dropped; the
        // wire line is absorbed and the '>' closes the scope cleanly
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <PROGRAMENV 0 0 \"Ghost\"\n",
            "      MIDIPLINK 0 1 176 7\n",
            "    >\n",
            "    <VST \"Synth\" s.so\n",
            "    >\n",
            "    <PROGRAMENV 1 0 \"Real\"\n",
            "      MIDIPLINK 0 2 176 8\n",
            "    >\n",
            "  >\n",
        ));
        assert_eq!(tracks[0].fx.len(), 1);
        let links = &tracks[0].fx[0].links;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].param_name, "Real");
        assert_eq!(links[0].wire.as_ref().unwrap().channel, 2);
    }

    #[test]
    fn envelope_closes_eagerly_at_any_depth() {
        // a deeply indented '>' still ends the envelope, so the following
        // MIDIPLINK is ignored
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"Synth\" s.so\n",
            "    >\n",
            "    <PROGRAMENV 0 0 \"Cutoff\"\n",
            "                >\n",
            "      MIDIPLINK 0 1 176 74\n",
            "  >\n",
        ));
        assert!(tracks[0].fx[0].links[0].wire.is_none());
    }

    #[test]
    fn chain_closes_by_depth_comparison() {
        // deep '>' lines inside fx sub-chunks leave the chain open; the '>'
        // at the chain's own indent ends it, after which envelopes are
        // ignored
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"One\" one.so\n",
            "          >\n",
            "    <VST \"Two\" two.so\n",
            "    >\n",
            "  >\n",
            "    <PROGRAMENV 0 0 \"Late\"\n",
            "      MIDIPLINK 0 1 176 74\n",
            "    >\n",
        ));
        assert_eq!(tracks[0].fx.len(), 2);
        assert!(tracks[0].fx[0].links.is_empty());
        assert!(tracks[0].fx[1].links.is_empty());
    }

    #[test]
    fn envelope_outside_any_chain_is_ignored() {
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <PROGRAMENV 0 0 \"Nope\"\n",
            "    MIDIPLINK 0 1 176 74\n",
            "  >\n",
        ));
        assert!(tracks[0].fx.is_empty());
    }

    #[test]
    fn new_track_resets_all_scopes() {
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"One\" one.so\n",
            "    >\n",
            "<TRACK {B}\n",
            "  <PROGRAMENV 0 0 \"NoChain\"\n",
        ));
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].fx.len(), 1);
        assert!(tracks[1].fx.is_empty());
    }

    #[test]
    fn later_name_overwrites_and_empty_clears() {
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  NAME \"First\"\n",
            "  NAME \"Second\"\n",
            "<TRACK {B}\n",
            "  NAME \"\"\n",
        ));
        assert_eq!(tracks[0].name.as_deref(), Some("Second"));
        assert_eq!(tracks[1].name, None);
    }

    #[test]
    fn bypass_flag_and_message_kinds() {
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"Synth\" s.so\n",
            "    >\n",
            "    <PROGRAMENV 0 1 \"A\"\n",
            "      MIDIPLINK 0 1 144 60\n",
            "    >\n",
            "    <PROGRAMENV 1 0 \"B\"\n",
            "      MIDIPLINK 2 3 224 50\n",
            "    >\n",
            "  >\n",
        ));
        let links = &tracks[0].fx[0].links;
        assert!(links[0].bypassed);
        assert_eq!(links[0].wire.as_ref().unwrap().message, Message::Note(60));
        assert_eq!(links[0].wire.as_ref().unwrap().message.value(), Some(60));
        let other = &links[1].wire.as_ref().unwrap().message;
        assert_eq!(*other, Message::Other(224));
        assert_eq!(other.value(), None);
        assert_eq!(other.kind(), 224);
    }

    #[test]
    fn link_index_is_flat_tree_order() {
        let tracks = build(concat!(
            "<TRACK {A}\n",
            "  <FXCHAIN\n",
            "    <VST \"One\" one.so\n",
            "    >\n",
            "    <PROGRAMENV 0 0 \"P0\"\n",
            "    >\n",
            "    <PROGRAMENV 1 0 \"P1\"\n",
            "    >\n",
            "  >\n",
            "<TRACK {B}\n",
            "  <FXCHAIN\n",
            "    <JS \"Util\" util\n",
            "    >\n",
            "    <PROGRAMENV 0 0 \"P2\"\n",
            "    >\n",
            "  >\n",
        ));
        let refs = link_index(&tracks);
        assert_eq!(
            refs,
            vec![
                LinkRef { track: 0, fx: 0, link: 0 },
                LinkRef { track: 0, fx: 0, link: 1 },
                LinkRef { track: 1, fx: 0, link: 0 },
            ]
        );
    }

    #[test]
    fn link_ref_parses_and_displays() {
        let r: LinkRef = "3/0/12".parse().unwrap();
        assert_eq!(r, LinkRef { track: 3, fx: 0, link: 12 });
        assert_eq!(r.to_string(), "3/0/12");
        assert!("3/0".parse::<LinkRef>().is_err());
        assert!("a/0/1".parse::<LinkRef>().is_err());
    }
}
