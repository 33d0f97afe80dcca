use std::path::Path;

/// In-memory copy of a project file, one entry per physical line.
///
/// Each line keeps its original terminator (`\n`, `\r\n`, or none on the
/// final line), so writing the store back out reproduces the input
/// byte-for-byte except for lines explicitly rewritten.
pub struct LineStore {
    lines: Vec<String>,
    modified: bool,
}

impl LineStore {
    pub fn from_text(text: &str) -> Self {
        LineStore {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
            modified: false,
        }
    }

    /// Read a file, decoding invalid UTF-8 lossily (project files may embed
    /// arbitrary vendor bytes in binary-as-text blobs).
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_text(&String::from_utf8_lossy(&bytes)))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line content without its terminator.
    pub fn content(&self, index: usize) -> Option<&str> {
        self.lines
            .get(index)
            .map(|l| l.trim_end_matches('\n').trim_end_matches('\r'))
    }

    /// Raw line including its terminator.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Replace the content of one line, keeping its original terminator.
    pub fn replace_content(&mut self, index: usize, content: &str) -> anyhow::Result<()> {
        let Some(line) = self.lines.get_mut(index) else {
            anyhow::bail!("line index {index} out of range (file has {} lines)", self.lines.len());
        };
        let terminator = if line.ends_with("\r\n") {
            "\r\n"
        } else if line.ends_with('\n') {
            "\n"
        } else {
            ""
        };
        *line = format!("{content}{terminator}");
        self.modified = true;
        Ok(())
    }

    /// Whether any line has been rewritten since the store was loaded.
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// The whole file as it would be written to disk.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Write the store verbatim to a path.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.text())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splits_preserve_terminators() {
        let store = LineStore::from_text("a\r\nb\nc");
        assert_eq!(store.len(), 3);
        assert_eq!(store.raw(0), Some("a\r\n"));
        assert_eq!(store.raw(1), Some("b\n"));
        assert_eq!(store.raw(2), Some("c"));
        assert_eq!(store.content(0), Some("a"));
        assert_eq!(store.content(2), Some("c"));
    }

    #[test]
    fn text_round_trips() {
        let input = "  <TRACK {X}\r\n    NAME \"t\"\n  >\n";
        assert_eq!(LineStore::from_text(input).text(), input);
    }

    #[test]
    fn replace_keeps_terminator_and_sets_modified() {
        let mut store = LineStore::from_text("one\r\ntwo\nthree");
        assert!(!store.modified());
        store.replace_content(0, "ONE").unwrap();
        store.replace_content(2, "THREE").unwrap();
        assert_eq!(store.raw(0), Some("ONE\r\n"));
        assert_eq!(store.raw(2), Some("THREE"));
        assert!(store.modified());
        assert_eq!(store.text(), "ONE\r\ntwo\nTHREE");
    }

    #[test]
    fn replace_out_of_range_fails() {
        let mut store = LineStore::from_text("a\n");
        assert!(store.replace_content(5, "x").is_err());
        assert!(!store.modified());
    }

    #[test]
    fn save_writes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.RPP");
        let store = LineStore::from_text("a\r\nb");
        store.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\r\nb");
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.RPP");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"NAME \"ok\"\n\xff\xfe junk\n").unwrap();
        drop(f);
        let store = LineStore::from_path(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.content(0), Some("NAME \"ok\""));
    }
}
