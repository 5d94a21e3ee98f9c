//! Conflict Markers
//!
//! Parses git conflict markers out of file content and rewrites content to
//! one side of every region.

use super::types::{ConflictRegion, ConflictSide};

const MARKER_OURS_START: &str = "<<<<<<<";
const MARKER_ANCESTOR_START: &str = "|||||||";
const MARKER_SEPARATOR: &str = "=======";
const MARKER_THEIRS_END: &str = ">>>>>>>";

/// One marker region, as line ranges into the source
struct RawRegion<'a> {
    ours: Vec<&'a str>,
    ancestor: Option<Vec<&'a str>>,
    theirs: Vec<&'a str>,
    start_line: u32,
    end_line: u32,
}

enum Piece<'a> {
    Line(&'a str),
    Region(RawRegion<'a>),
}

/// Split content into plain lines and marker regions. Handles 2-way and
/// diff3 markers; an unterminated region runs to end of input.
fn scan(content: &str) -> Vec<Piece<'_>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut pieces = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].starts_with(MARKER_OURS_START) {
            pieces.push(Piece::Line(lines[i]));
            i += 1;
            continue;
        }

        let start_line = i as u32 + 1;
        i += 1;

        let mut ours = Vec::new();
        while i < lines.len()
            && !lines[i].starts_with(MARKER_SEPARATOR)
            && !lines[i].starts_with(MARKER_ANCESTOR_START)
        {
            ours.push(lines[i]);
            i += 1;
        }

        let mut ancestor = None;
        if i < lines.len() && lines[i].starts_with(MARKER_ANCESTOR_START) {
            i += 1;
            let mut base = Vec::new();
            while i < lines.len() && !lines[i].starts_with(MARKER_SEPARATOR) {
                base.push(lines[i]);
                i += 1;
            }
            ancestor = Some(base);
        }

        if i < lines.len() && lines[i].starts_with(MARKER_SEPARATOR) {
            i += 1;
        }

        let mut theirs = Vec::new();
        while i < lines.len() && !lines[i].starts_with(MARKER_THEIRS_END) {
            theirs.push(lines[i]);
            i += 1;
        }

        let end_line = i as u32 + 1;
        if i < lines.len() {
            i += 1;
        }

        pieces.push(Piece::Region(RawRegion {
            ours,
            ancestor,
            theirs,
            start_line,
            end_line,
        }));
    }

    pieces
}

/// Parse conflict regions from file content.
///
/// ```text
/// <<<<<<< HEAD
/// our content
/// ||||||| base        (diff3 only)
/// ancestor content
/// =======
/// their content
/// >>>>>>> branch
/// ```
pub fn parse_conflicts(content: &str) -> Vec<ConflictRegion> {
    scan(content)
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Region(region) => Some(ConflictRegion {
                ours: region.ours.join("\n"),
                theirs: region.theirs.join("\n"),
                ancestor: region.ancestor.map(|lines| lines.join("\n")),
                start_line: region.start_line,
                end_line: region.end_line,
            }),
            Piece::Line(_) => None,
        })
        .collect()
}

pub fn has_conflict_markers(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.starts_with(MARKER_OURS_START))
}

/// Rewrite content keeping one side of every conflict region. A trailing
/// newline in the input is preserved.
pub fn resolve_markers(content: &str, side: ConflictSide) -> String {
    let mut out: Vec<&str> = Vec::new();
    for piece in scan(content) {
        match piece {
            Piece::Line(line) => out.push(line),
            Piece::Region(region) => match side {
                ConflictSide::Ours => out.extend(region.ours),
                ConflictSide::Theirs => out.extend(region.theirs),
            },
        }
    }

    let mut resolved = out.join("\n");
    if content.ends_with('\n') && !resolved.is_empty() {
        resolved.push('\n');
    }
    resolved
}
