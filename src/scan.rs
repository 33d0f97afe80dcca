use crate::lines::LineStore;

/// Plugin-format marker on an FX block-open line. Closed set; anything else
/// is not recognized as an FX declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxKind {
    Vst,
    Vst3,
    Au,
    Js,
    Clap,
}

impl FxKind {
    pub fn tag(self) -> &'static str {
        match self {
            FxKind::Vst => "VST",
            FxKind::Vst3 => "VST3",
            FxKind::Au => "AU",
            FxKind::Js => "JS",
            FxKind::Clap => "CLAP",
        }
    }

    fn from_tag(tag: &str) -> Option<FxKind> {
        match tag {
            "VST" => Some(FxKind::Vst),
            "VST3" => Some(FxKind::Vst3),
            "AU" => Some(FxKind::Au),
            "JS" => Some(FxKind::Js),
            "CLAP" => Some(FxKind::Clap),
            _ => None,
        }
    }
}

/// One recognized line shape. `Other` covers every line that matches none of
/// the shapes; such lines still occupy their index but carry no structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// `<TRACK ...` — GUID pulled out of the first `{...}` pair, if any.
    TrackOpen { guid: Option<String> },
    /// `<FXCHAIN`
    ChainOpen,
    /// `<VST "name" ...` and friends.
    FxOpen { kind: FxKind, name: String },
    /// `<PROGRAMENV <param-id> <bypass> "<param-name>"`
    EnvOpen {
        param_id: String,
        bypass: u32,
        param_name: String,
    },
    /// `NAME value` — surrounding quotes stripped.
    TrackName { name: String },
    /// `MIDIPLINK <bus> <channel> <kind> <value>`
    Wire {
        bus: u32,
        channel: u32,
        kind: u32,
        value: u32,
    },
    /// A lone `>`.
    BlockClose,
    Other,
}

/// A classified line: its event plus the two structural signals the model
/// builder needs — indentation depth and absolute line index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub line: usize,
    pub depth: usize,
    pub event: LineEvent,
}

/// Classify every line of the store in order. Single forward pass, never
/// backtracks, never fails: unrecognized content becomes `Other`.
pub fn scan(store: &LineStore) -> Vec<ScanEvent> {
    (0..store.len())
        .filter_map(|i| store.content(i).map(|c| classify(i, c)))
        .collect()
}

/// Classify one line. Depth is the leading-whitespace width of the raw
/// content; structure is matched against the stripped remainder by a fixed
/// priority order of try-match functions.
pub fn classify(line: usize, content: &str) -> ScanEvent {
    let depth = content.len() - content.trim_start().len();
    let stripped = content.trim();
    let event = try_track_open(stripped)
        .or_else(|| try_track_name(stripped))
        .or_else(|| try_chain_open(stripped))
        .or_else(|| try_fx_open(stripped))
        .or_else(|| try_env_open(stripped))
        .or_else(|| try_wire(stripped))
        .or_else(|| try_block_close(stripped))
        .unwrap_or(LineEvent::Other);
    ScanEvent { line, depth, event }
}

fn try_track_open(s: &str) -> Option<LineEvent> {
    if !s.starts_with("<TRACK ") {
        return None;
    }
    // GUID is scanned out by brace substring match, not a general grammar
    let guid = s.find('{').and_then(|open| {
        let rest = &s[open + 1..];
        let close = rest.find('}')?;
        if close == 0 {
            None
        } else {
            Some(rest[..close].to_string())
        }
    });
    Some(LineEvent::TrackOpen { guid })
}

fn try_track_name(s: &str) -> Option<LineEvent> {
    let rest = s.strip_prefix("NAME ")?;
    Some(LineEvent::TrackName {
        name: rest.trim_matches('"').to_string(),
    })
}

fn try_chain_open(s: &str) -> Option<LineEvent> {
    s.starts_with("<FXCHAIN").then_some(LineEvent::ChainOpen)
}

fn try_fx_open(s: &str) -> Option<LineEvent> {
    let rest = s.strip_prefix('<')?;
    let tag_end = rest.find(char::is_whitespace)?;
    let kind = FxKind::from_tag(&rest[..tag_end])?;
    let name = quoted(&rest[tag_end..])?;
    Some(LineEvent::FxOpen {
        kind,
        name: name.to_string(),
    })
}

fn try_env_open(s: &str) -> Option<LineEvent> {
    let rest = s.strip_prefix("<PROGRAMENV ")?.trim_start();
    let id_end = rest.find(char::is_whitespace)?;
    let (param_id, rest) = rest.split_at(id_end);
    let rest = rest.trim_start();
    let bypass_end = rest.find(char::is_whitespace)?;
    let (bypass_tok, rest) = rest.split_at(bypass_end);
    let bypass: u32 = bypass_tok.parse().ok()?;
    let param_name = quoted(rest)?;
    if param_name.is_empty() {
        return None;
    }
    Some(LineEvent::EnvOpen {
        param_id: param_id.to_string(),
        bypass,
        param_name: param_name.to_string(),
    })
}

fn try_wire(s: &str) -> Option<LineEvent> {
    let rest = s.strip_prefix("MIDIPLINK ")?;
    let mut it = rest.split_whitespace();
    let bus: u32 = it.next()?.parse().ok()?;
    let channel: u32 = it.next()?.parse().ok()?;
    let kind: u32 = it.next()?.parse().ok()?;
    let value: u32 = it.next()?.parse().ok()?;
    // trailing tokens are allowed and ignored
    Some(LineEvent::Wire {
        bus,
        channel,
        kind,
        value,
    })
}

fn try_block_close(s: &str) -> Option<LineEvent> {
    (s == ">").then_some(LineEvent::BlockClose)
}

/// First `"..."`-delimited span after leading whitespace.
fn quoted(s: &str) -> Option<&str> {
    let rest = s.trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}
